use std::sync::Arc;

use actix_web::http::header::LOCATION;
use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{BookDetails, BookDetailsPatch, BookId, BookQuery, BookResponse, MessageResponse, NewBook};
use crate::auth::AuthenticatedUser;
use crate::books_repository::{normalize_category, BookFilter, BooksRepository};
use crate::error::ApiError;

fn required(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn book_from_request(book: NewBook) -> Result<BookDetails, ApiError> {
    let (Some(title), Some(author)) = (required(&book.title), required(&book.author)) else {
        return Err(ApiError::BadRequest(
            "Title and author are required".to_string(),
        ));
    };
    let stock = book.stock.unwrap_or(1);
    let category = book
        .category
        .map(|category| normalize_category(&category))
        .filter(|category| !category.is_empty())
        .unwrap_or_else(|| "others".to_string());
    Ok(BookDetails {
        title,
        author,
        category,
        cover_image: book.cover_image.unwrap_or_default(),
        description: book.description.unwrap_or_default(),
        intro: book.intro.unwrap_or_default(),
        file_url: book.file_url.unwrap_or_default(),
        pages: book.pages.unwrap_or_default(),
        stock,
        available: book.available.unwrap_or(stock),
    })
}

fn normalize_patch(mut patch: BookDetailsPatch) -> Result<BookDetailsPatch, ApiError> {
    let blank = |value: &Option<String>| value.as_ref().is_some_and(|v| v.trim().is_empty());
    if blank(&patch.title) || blank(&patch.author) {
        return Err(ApiError::BadRequest(
            "Title and author cannot be empty".to_string(),
        ));
    }
    patch.category = patch.category.map(|category| normalize_category(&category));
    Ok(patch)
}

#[api_v2_operation]
/// Lists the catalog newest first, optionally filtered by keyword and category
pub async fn list_books(
    books: Data<Arc<dyn BooksRepository>>,
    query: web::Query<BookQuery>,
) -> Result<HttpResponse, Error> {
    let filter = BookFilter::from(query.into_inner());
    let found: Vec<BookResponse> = books
        .list_books(&filter)
        .await
        .map_err(ApiError::from)?
        .into_iter()
        .map(|(id, details)| BookResponse::new(id, details))
        .collect();
    Ok(HttpResponse::Ok().json(found))
}

#[api_v2_operation]
pub async fn get_book(
    books: Data<Arc<dyn BooksRepository>>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let book_id = book_id.into_inner();
    let details = books.get_book(book_id).await.map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(BookResponse::new(book_id, details)))
}

#[api_v2_operation]
pub async fn add_book(
    user: AuthenticatedUser,
    books: Data<Arc<dyn BooksRepository>>,
    book: web::Json<NewBook>,
) -> Result<HttpResponse, Error> {
    user.require_admin()?;
    let details = book_from_request(book.into_inner())?;
    let book_id = books
        .add_book(details.clone())
        .await
        .map_err(ApiError::from)?;
    tracing::info!(book_id, title = %details.title, "Book added");

    Ok(HttpResponse::Created()
        .append_header((LOCATION, format!("/api/books/{}", book_id)))
        .json(BookResponse::new(book_id, details)))
}

#[api_v2_operation]
/// Merges the given fields into the stored book
pub async fn update_book(
    user: AuthenticatedUser,
    books: Data<Arc<dyn BooksRepository>>,
    book_id: web::Path<BookId>,
    patch: web::Json<BookDetailsPatch>,
) -> Result<HttpResponse, Error> {
    user.require_admin()?;
    let book_id = book_id.into_inner();
    let patch = normalize_patch(patch.into_inner())?;
    let details = books
        .update_book(book_id, patch)
        .await
        .map_err(ApiError::from)?;
    tracing::info!(book_id, "Book updated");

    Ok(HttpResponse::Ok().json(BookResponse::new(book_id, details)))
}

#[api_v2_operation]
pub async fn delete_book(
    user: AuthenticatedUser,
    books: Data<Arc<dyn BooksRepository>>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    user.require_admin()?;
    let book_id = book_id.into_inner();
    books.delete_book(book_id).await.map_err(ApiError::from)?;
    tracing::info!(book_id, "Book deleted");

    Ok(HttpResponse::Ok().json(MessageResponse::new("Book deleted")))
}

#[cfg(test)]
mod books_handler_tests {
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::json;

    use crate::api::{BookResponse, UserRole};
    use crate::app_config::test_support::{init_test_app, TestState};

    #[actix_web::test]
    async fn admin_manages_catalog() {
        let state = TestState::new();
        let (_, token) = state
            .add_user("Admin", "admin@example.com", UserRole::Admin, "password")
            .await;
        let app = init_test_app!(state);
        let bearer = format!("Bearer {}", token);

        let request = test::TestRequest::post()
            .uri("/api/books")
            .insert_header((AUTHORIZATION, bearer.clone()))
            .set_json(json!({
                "title": "  Clean Code ",
                "author": "Robert C. Martin",
                "category": " Programming ",
                "img": "cover.png",
                "stock": 3
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: BookResponse = test::read_body_json(response).await;
        assert_eq!(created.title, "Clean Code");
        assert_eq!(created.category, "programming");
        assert_eq!(created.cover_image, "cover.png");
        assert_eq!(created.image, "cover.png");
        assert_eq!((created.stock, created.available), (3, 3));

        let request = test::TestRequest::put()
            .uri(&format!("/api/books/{}", created.id))
            .insert_header((AUTHORIZATION, bearer.clone()))
            .set_json(json!({ "available": 1, "pages": 464 }))
            .to_request();
        let updated: BookResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(updated.available, 1);
        assert_eq!(updated.pages, 464);
        assert_eq!(updated.title, "Clean Code");

        let request = test::TestRequest::put()
            .uri(&format!("/api/books/{}", created.id))
            .insert_header((AUTHORIZATION, bearer.clone()))
            .set_json(json!({ "available": 4 }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::delete()
            .uri(&format!("/api/books/{}", created.id))
            .insert_header((AUTHORIZATION, bearer))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let request = test::TestRequest::get()
            .uri(&format!("/api/books/{}", created.id))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn students_cannot_change_catalog() {
        let state = TestState::new();
        let (_, token) = state
            .add_user("Alice", "alice@example.com", UserRole::Student, "password")
            .await;
        let book_id = state.add_book("Dune", "Frank Herbert", "novel", 1).await;
        let app = init_test_app!(state);

        let request = test::TestRequest::post()
            .uri("/api/books")
            .insert_header((AUTHORIZATION, format!("Bearer {}", token)))
            .set_json(json!({ "title": "T", "author": "A" }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = test::TestRequest::delete()
            .uri(&format!("/api/books/{}", book_id))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn create_requires_title_and_consistent_stock() {
        let state = TestState::new();
        let (_, token) = state
            .add_user("Admin", "admin@example.com", UserRole::Admin, "password")
            .await;
        let app = init_test_app!(state);

        for body in [
            json!({ "title": " ", "author": "A" }),
            json!({ "title": "T", "author": "A", "stock": 1, "available": 2 }),
        ] {
            let request = test::TestRequest::post()
                .uri("/api/books")
                .insert_header((AUTHORIZATION, format!("Bearer {}", token)))
                .set_json(body)
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[actix_web::test]
    async fn list_filters_by_keyword_and_category() {
        let state = TestState::new();
        let dune = state.add_book("Dune", "Frank Herbert", "novel", 1).await;
        state.add_book("Rust in Action", "Tim McNamara", "programming", 1).await;
        let messiah = state.add_book("Dune Messiah", "Frank Herbert", "novel", 1).await;
        let app = init_test_app!(state);

        let request = test::TestRequest::get()
            .uri("/api/books?keyword=herbert&category=Novel")
            .to_request();
        let found: Vec<BookResponse> = test::call_and_read_body_json(&app, request).await;
        let ids: Vec<_> = found.iter().map(|book| book.id).collect();
        assert_eq!(ids, vec![messiah, dune]);

        let request = test::TestRequest::get()
            .uri("/api/books?category=all")
            .to_request();
        let found: Vec<BookResponse> = test::call_and_read_body_json(&app, request).await;
        assert_eq!(found.len(), 3);
    }
}
