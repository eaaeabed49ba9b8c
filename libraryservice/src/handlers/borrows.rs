use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{BorrowId, BorrowQuery, CreateBorrowRequest, MessageResponse, UserId};
use crate::auth::AuthenticatedUser;
use crate::circulation::Circulation;
use crate::error::ApiError;

#[api_v2_operation]
/// All borrow records, optionally filtered by status, user and book
pub async fn list_borrows(
    user: AuthenticatedUser,
    circulation: Data<Circulation>,
    query: web::Query<BorrowQuery>,
) -> Result<HttpResponse, Error> {
    user.require_admin()?;
    let views = circulation
        .list_all(query.into_inner())
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(views))
}

#[api_v2_operation]
pub async fn my_borrows(
    user: AuthenticatedUser,
    circulation: Data<Circulation>,
) -> Result<HttpResponse, Error> {
    let views = circulation
        .list_for_user(user.id)
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(views))
}

#[api_v2_operation]
pub async fn user_borrows(
    user: AuthenticatedUser,
    circulation: Data<Circulation>,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, Error> {
    let user_id = user_id.into_inner();
    user.require_self_or_admin(user_id)?;
    let views = circulation
        .list_for_user(user_id)
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(views))
}

#[api_v2_operation]
/// Files a borrow request awaiting approval. Admins may file it on behalf of another user
pub async fn create_borrow(
    user: AuthenticatedUser,
    circulation: Data<Circulation>,
    request: web::Json<CreateBorrowRequest>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();
    let borrower = match request.user_id {
        Some(user_id) if user.is_admin() => user_id,
        _ => user.id,
    };
    let view = circulation
        .request_borrow(borrower, request.book_id)
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Created().json(view))
}

#[api_v2_operation]
pub async fn approve_borrow(
    user: AuthenticatedUser,
    circulation: Data<Circulation>,
    borrow_id: web::Path<BorrowId>,
) -> Result<HttpResponse, Error> {
    user.require_admin()?;
    let view = circulation
        .approve(borrow_id.into_inner())
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(view))
}

#[api_v2_operation]
pub async fn reject_borrow(
    user: AuthenticatedUser,
    circulation: Data<Circulation>,
    borrow_id: web::Path<BorrowId>,
) -> Result<HttpResponse, Error> {
    user.require_admin()?;
    let view = circulation
        .reject(borrow_id.into_inner())
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(view))
}

async fn require_owner_or_admin(
    user: &AuthenticatedUser,
    circulation: &Circulation,
    borrow_id: BorrowId,
) -> Result<(), ApiError> {
    let record = circulation.get_borrow(borrow_id).await?;
    user.require_self_or_admin(record.user_id)
}

#[api_v2_operation]
pub async fn extend_borrow(
    user: AuthenticatedUser,
    circulation: Data<Circulation>,
    borrow_id: web::Path<BorrowId>,
) -> Result<HttpResponse, Error> {
    let borrow_id = borrow_id.into_inner();
    require_owner_or_admin(&user, &circulation, borrow_id).await?;
    let view = circulation
        .extend(borrow_id)
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(view))
}

#[api_v2_operation]
pub async fn return_borrow(
    user: AuthenticatedUser,
    circulation: Data<Circulation>,
    borrow_id: web::Path<BorrowId>,
) -> Result<HttpResponse, Error> {
    let borrow_id = borrow_id.into_inner();
    require_owner_or_admin(&user, &circulation, borrow_id).await?;
    let view = circulation
        .mark_returned(borrow_id)
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(view))
}

#[api_v2_operation]
pub async fn delete_borrow(
    user: AuthenticatedUser,
    circulation: Data<Circulation>,
    borrow_id: web::Path<BorrowId>,
) -> Result<HttpResponse, Error> {
    user.require_admin()?;
    circulation
        .remove(borrow_id.into_inner())
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Deleted")))
}

#[cfg(test)]
mod borrows_handler_tests {
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::json;

    use crate::api::{BookResponse, BorrowAdminView, BorrowStatus, BorrowStudentView, UserRole};
    use crate::app_config::test_support::{init_test_app, TestState};

    fn bearer(token: &str) -> (actix_web::http::header::HeaderName, String) {
        (AUTHORIZATION, format!("Bearer {}", token))
    }

    #[actix_web::test]
    async fn borrow_lifecycle_over_http() {
        let state = TestState::new();
        let (student_id, student) = state
            .add_user("Alice", "alice@example.com", UserRole::Student, "password")
            .await;
        let (_, admin) = state
            .add_user("Admin", "admin@example.com", UserRole::Admin, "password")
            .await;
        let book_id = state.add_book("Dune", "Frank Herbert", "novel", 2).await;
        let app = init_test_app!(state);

        let request = test::TestRequest::post()
            .uri("/api/borrow")
            .insert_header(bearer(&student))
            .set_json(json!({ "bookId": book_id }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let requested: BorrowAdminView = test::read_body_json(response).await;
        assert_eq!(requested.status, BorrowStatus::PendingApproval);
        assert_eq!(requested.user_id, student_id);
        assert_eq!(requested.borrower_name, "Alice");

        // students cannot approve their own requests
        let request = test::TestRequest::put()
            .uri(&format!("/api/borrow/{}/approve", requested.id))
            .insert_header(bearer(&student))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = test::TestRequest::put()
            .uri(&format!("/api/borrow/{}/approve", requested.id))
            .insert_header(bearer(&admin))
            .to_request();
        let approved: BorrowAdminView = test::call_and_read_body_json(&app, request).await;
        assert_eq!(approved.status, BorrowStatus::Borrowing);
        assert_eq!(approved.due_date.len(), "YYYY-MM-DD".len());

        let request = test::TestRequest::get()
            .uri(&format!("/api/books/{}", book_id))
            .to_request();
        let book: BookResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(book.available, 1);

        let request = test::TestRequest::put()
            .uri(&format!("/api/borrow/{}/extend", requested.id))
            .insert_header(bearer(&student))
            .to_request();
        let extended: BorrowAdminView = test::call_and_read_body_json(&app, request).await;
        assert_eq!(extended.extensions, 1);
        assert_eq!(extended.extended_days, 7);

        let request = test::TestRequest::get()
            .uri("/api/borrow/me")
            .insert_header(bearer(&student))
            .to_request();
        let mine: Vec<BorrowStudentView> = test::call_and_read_body_json(&app, request).await;
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].book_title, "Dune");
        assert_eq!(mine[0].days_remaining, Some(21));

        let request = test::TestRequest::put()
            .uri(&format!("/api/borrow/{}/return", requested.id))
            .insert_header(bearer(&student))
            .to_request();
        let returned: BorrowAdminView = test::call_and_read_body_json(&app, request).await;
        assert_eq!(returned.status, BorrowStatus::Returned);

        let request = test::TestRequest::put()
            .uri(&format!("/api/borrow/{}/return", requested.id))
            .insert_header(bearer(&student))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::get()
            .uri(&format!("/api/books/{}", book_id))
            .to_request();
        let book: BookResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(book.available, 2);
    }

    #[actix_web::test]
    async fn fourth_active_request_is_refused() {
        let state = TestState::new();
        let (_, student) = state
            .add_user("Alice", "alice@example.com", UserRole::Student, "password")
            .await;
        let book_id = state.add_book("Dune", "Frank Herbert", "novel", 5).await;
        let app = init_test_app!(state);

        for expected in [
            StatusCode::CREATED,
            StatusCode::CREATED,
            StatusCode::CREATED,
            StatusCode::BAD_REQUEST,
        ] {
            let request = test::TestRequest::post()
                .uri("/api/borrow")
                .insert_header(bearer(&student))
                .set_json(json!({ "bookId": book_id }))
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), expected);
        }
    }

    #[actix_web::test]
    async fn records_are_private_to_owner_and_admin() {
        let state = TestState::new();
        let (alice_id, alice) = state
            .add_user("Alice", "alice@example.com", UserRole::Student, "password")
            .await;
        let (_, bob) = state
            .add_user("Bob", "bob@example.com", UserRole::Student, "password")
            .await;
        let (_, admin) = state
            .add_user("Admin", "admin@example.com", UserRole::Admin, "password")
            .await;
        let book_id = state.add_book("Dune", "Frank Herbert", "novel", 1).await;
        let app = init_test_app!(state);

        // admin files on behalf of alice, a student passing userId is ignored
        let request = test::TestRequest::post()
            .uri("/api/borrow")
            .insert_header(bearer(&admin))
            .set_json(json!({ "bookId": book_id, "userId": alice_id }))
            .to_request();
        let requested: BorrowAdminView = test::call_and_read_body_json(&app, request).await;
        assert_eq!(requested.user_id, alice_id);

        let request = test::TestRequest::post()
            .uri("/api/borrow")
            .insert_header(bearer(&bob))
            .set_json(json!({ "bookId": book_id, "userId": alice_id }))
            .to_request();
        let bobs: BorrowAdminView = test::call_and_read_body_json(&app, request).await;
        assert_ne!(bobs.user_id, alice_id);

        let request = test::TestRequest::get()
            .uri(&format!("/api/borrow/user/{}", alice_id))
            .insert_header(bearer(&bob))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = test::TestRequest::put()
            .uri(&format!("/api/borrow/{}/extend", requested.id))
            .insert_header(bearer(&bob))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = test::TestRequest::get()
            .uri(&format!("/api/borrow/user/{}", alice_id))
            .insert_header(bearer(&alice))
            .to_request();
        let alices: Vec<BorrowStudentView> = test::call_and_read_body_json(&app, request).await;
        assert_eq!(alices.len(), 1);

        let request = test::TestRequest::get()
            .uri("/api/borrow")
            .insert_header(bearer(&bob))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = test::TestRequest::get()
            .uri(&format!("/api/borrow?status=Pending%20Approval&userId={}", alice_id))
            .insert_header(bearer(&admin))
            .to_request();
        let pending: Vec<BorrowAdminView> = test::call_and_read_body_json(&app, request).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, requested.id);
    }

    #[actix_web::test]
    async fn admin_rejects_and_deletes() {
        let state = TestState::new();
        let (_, student) = state
            .add_user("Alice", "alice@example.com", UserRole::Student, "password")
            .await;
        let (_, admin) = state
            .add_user("Admin", "admin@example.com", UserRole::Admin, "password")
            .await;
        let book_id = state.add_book("Dune", "Frank Herbert", "novel", 1).await;
        let app = init_test_app!(state);

        let request = test::TestRequest::post()
            .uri("/api/borrow")
            .insert_header(bearer(&student))
            .set_json(json!({ "bookId": book_id }))
            .to_request();
        let requested: BorrowAdminView = test::call_and_read_body_json(&app, request).await;

        let request = test::TestRequest::put()
            .uri(&format!("/api/borrow/{}/reject", requested.id))
            .insert_header(bearer(&admin))
            .to_request();
        let rejected: BorrowAdminView = test::call_and_read_body_json(&app, request).await;
        assert_eq!(rejected.status, BorrowStatus::Rejected);

        let request = test::TestRequest::put()
            .uri(&format!("/api/borrow/{}/return", requested.id))
            .insert_header(bearer(&student))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::delete()
            .uri(&format!("/api/borrow/{}", requested.id))
            .insert_header(bearer(&admin))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let request = test::TestRequest::delete()
            .uri(&format!("/api/borrow/{}", requested.id))
            .insert_header(bearer(&admin))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
