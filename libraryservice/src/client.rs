use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use reqwest_tracing::TracingMiddleware;
use serde::de::DeserializeOwned;

use crate::api::{
    AuthResponse, BookDetailsPatch, BookId, BookQuery, BookResponse, BorrowAdminView, BorrowId,
    BorrowQuery, BorrowStudentView, CreateBorrowRequest, HealthResponse, LoginRequest,
    MessageResponse, NewBook, ProfileUpdate, RegisterRequest, UserId, UserProfile,
};

/// Non-success answer from the service, carries the status and the `message` body
#[derive(Debug, thiserror::Error)]
#[error("Request failed with {status}: {message}")]
pub struct ServiceError {
    pub status: StatusCode,
    pub message: String,
}

/// Typed client of the library service. Calls made after `register` or `login`
/// carry the returned token.
///
/// Only GET requests are retried on transient failures, every other call is
/// sent once.
pub struct LibraryServiceClient {
    url: String,
    client: ClientWithMiddleware,
    read_client: ClientWithMiddleware,
    token: Option<String>,
}

impl LibraryServiceClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
            .build_with_max_retries(2);
        let client = ClientBuilder::new(reqwest_client.clone())
            .with(TracingMiddleware::default())
            .build();
        let read_client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
            read_client,
            token: None,
        })
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> anyhow::Result<T> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<MessageResponse>()
                .await
                .map(|body| body.message)
                .unwrap_or_default();
            return Err(ServiceError { status, message }.into());
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to decode response ({})", status))
    }

    /// Calls GET /api/health
    pub async fn health(&self) -> anyhow::Result<bool> {
        let health: HealthResponse = self
            .send(self.read_client.get(self.endpoint("/api/health")))
            .await?;
        Ok(health.ok)
    }

    /// Calls POST /api/auth/register and keeps the returned token
    pub async fn register(&mut self, request: &RegisterRequest) -> anyhow::Result<AuthResponse> {
        let response: AuthResponse = self
            .send(
                self.client
                    .post(self.endpoint("/api/auth/register"))
                    .json(request),
            )
            .await?;
        self.token = Some(response.token.clone());
        Ok(response)
    }

    /// Calls POST /api/auth/login and keeps the returned token
    pub async fn login(&mut self, email: &str, password: &str) -> anyhow::Result<AuthResponse> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self
            .send(
                self.client
                    .post(self.endpoint("/api/auth/login"))
                    .json(&request),
            )
            .await?;
        self.token = Some(response.token.clone());
        Ok(response)
    }

    /// Calls GET /api/auth/profile
    pub async fn profile(&self) -> anyhow::Result<UserProfile> {
        self.send(self.read_client.get(self.endpoint("/api/auth/profile")))
            .await
    }

    /// Calls PUT /api/auth/profile
    pub async fn update_profile(&self, update: &ProfileUpdate) -> anyhow::Result<UserProfile> {
        self.send(
            self.client
                .put(self.endpoint("/api/auth/profile"))
                .json(update),
        )
        .await
    }

    /// Calls GET /api/auth/users, admin only
    pub async fn list_users(&self) -> anyhow::Result<Vec<UserProfile>> {
        self.send(self.read_client.get(self.endpoint("/api/auth/users")))
            .await
    }

    /// Calls GET /api/books
    pub async fn list_books(&self, query: &BookQuery) -> anyhow::Result<Vec<BookResponse>> {
        self.send(self.read_client.get(self.endpoint("/api/books")).query(query))
            .await
    }

    /// Calls GET /api/books/{book_id}
    /// None if the book is not in the catalog
    pub async fn get_book(&self, book_id: BookId) -> anyhow::Result<Option<BookResponse>> {
        let result = self
            .send(
                self.read_client
                    .get(self.endpoint(&format!("/api/books/{}", book_id))),
            )
            .await;
        match result {
            Ok(book) => Ok(Some(book)),
            Err(err)
                if err
                    .downcast_ref::<ServiceError>()
                    .is_some_and(|err| err.status == StatusCode::NOT_FOUND) =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Calls POST /api/books, admin only
    pub async fn add_book(&self, book: &NewBook) -> anyhow::Result<BookResponse> {
        self.send(self.client.post(self.endpoint("/api/books")).json(book))
            .await
    }

    /// Calls PUT /api/books/{book_id}, admin only
    pub async fn update_book(
        &self,
        book_id: BookId,
        patch: &BookDetailsPatch,
    ) -> anyhow::Result<BookResponse> {
        self.send(
            self.client
                .put(self.endpoint(&format!("/api/books/{}", book_id)))
                .json(patch),
        )
        .await
    }

    /// Calls DELETE /api/books/{book_id}, admin only
    pub async fn delete_book(&self, book_id: BookId) -> anyhow::Result<()> {
        let _: MessageResponse = self
            .send(
                self.client
                    .delete(self.endpoint(&format!("/api/books/{}", book_id))),
            )
            .await?;
        Ok(())
    }

    /// Calls POST /api/borrow. `user_id` is only honoured for admins
    pub async fn request_borrow(
        &self,
        book_id: BookId,
        user_id: Option<UserId>,
    ) -> anyhow::Result<BorrowAdminView> {
        let request = CreateBorrowRequest { book_id, user_id };
        self.send(self.client.post(self.endpoint("/api/borrow")).json(&request))
            .await
    }

    async fn transition(&self, borrow_id: BorrowId, action: &str) -> anyhow::Result<BorrowAdminView> {
        self.send(
            self.client
                .put(self.endpoint(&format!("/api/borrow/{}/{}", borrow_id, action))),
        )
        .await
    }

    /// Calls PUT /api/borrow/{borrow_id}/approve, admin only
    pub async fn approve_borrow(&self, borrow_id: BorrowId) -> anyhow::Result<BorrowAdminView> {
        self.transition(borrow_id, "approve").await
    }

    /// Calls PUT /api/borrow/{borrow_id}/reject, admin only
    pub async fn reject_borrow(&self, borrow_id: BorrowId) -> anyhow::Result<BorrowAdminView> {
        self.transition(borrow_id, "reject").await
    }

    /// Calls PUT /api/borrow/{borrow_id}/extend
    pub async fn extend_borrow(&self, borrow_id: BorrowId) -> anyhow::Result<BorrowAdminView> {
        self.transition(borrow_id, "extend").await
    }

    /// Calls PUT /api/borrow/{borrow_id}/return
    pub async fn return_borrow(&self, borrow_id: BorrowId) -> anyhow::Result<BorrowAdminView> {
        self.transition(borrow_id, "return").await
    }

    /// Calls DELETE /api/borrow/{borrow_id}, admin only
    pub async fn delete_borrow(&self, borrow_id: BorrowId) -> anyhow::Result<()> {
        let _: MessageResponse = self
            .send(
                self.client
                    .delete(self.endpoint(&format!("/api/borrow/{}", borrow_id))),
            )
            .await?;
        Ok(())
    }

    /// Calls GET /api/borrow, admin only
    pub async fn list_borrows(&self, query: &BorrowQuery) -> anyhow::Result<Vec<BorrowAdminView>> {
        self.send(self.read_client.get(self.endpoint("/api/borrow")).query(query))
            .await
    }

    /// Calls GET /api/borrow/me
    pub async fn my_borrows(&self) -> anyhow::Result<Vec<BorrowStudentView>> {
        self.send(self.read_client.get(self.endpoint("/api/borrow/me")))
            .await
    }

    /// Calls GET /api/borrow/user/{user_id}
    pub async fn user_borrows(&self, user_id: UserId) -> anyhow::Result<Vec<BorrowStudentView>> {
        self.send(
            self.read_client
                .get(self.endpoint(&format!("/api/borrow/user/{}", user_id))),
        )
        .await
    }
}

#[cfg(test)]
mod client_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use actix_web::dev::ServerHandle;
    use actix_web::{web, App, HttpResponse, HttpServer};

    use super::*;

    #[derive(Default)]
    struct Hits {
        borrow_requests: AtomicUsize,
        book_listings: AtomicUsize,
    }

    async fn unavailable_borrow(hits: web::Data<Hits>) -> HttpResponse {
        hits.borrow_requests.fetch_add(1, Ordering::SeqCst);
        HttpResponse::ServiceUnavailable().json(MessageResponse::new("Try again later"))
    }

    async fn unavailable_books(hits: web::Data<Hits>) -> HttpResponse {
        hits.book_listings.fetch_add(1, Ordering::SeqCst);
        HttpResponse::ServiceUnavailable().json(MessageResponse::new("Try again later"))
    }

    /// Serves 503 on every route and counts the calls
    fn start_unavailable_service(hits: web::Data<Hits>) -> (String, ServerHandle) {
        let server = HttpServer::new(move || {
            App::new()
                .app_data(hits.clone())
                .route("/api/borrow", web::post().to(unavailable_borrow))
                .route("/api/books", web::get().to(unavailable_books))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let address = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (format!("http://{}", address), handle)
    }

    fn status_of(err: &anyhow::Error) -> Option<StatusCode> {
        err.downcast_ref::<ServiceError>().map(|err| err.status)
    }

    #[actix_web::test]
    async fn borrow_request_is_sent_once_on_server_error() {
        let hits = web::Data::new(Hits::default());
        let (url, handle) = start_unavailable_service(hits.clone());
        let client = LibraryServiceClient::new(&url).unwrap();

        let err = client.request_borrow(1, None).await.unwrap_err();
        assert_eq!(status_of(&err), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(
            err.downcast_ref::<ServiceError>().unwrap().message,
            "Try again later"
        );
        assert_eq!(hits.borrow_requests.load(Ordering::SeqCst), 1);

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn book_listing_is_retried_on_server_error() {
        let hits = web::Data::new(Hits::default());
        let (url, handle) = start_unavailable_service(hits.clone());
        let client = LibraryServiceClient::new(&url).unwrap();

        let err = client.list_books(&BookQuery::default()).await.unwrap_err();
        assert_eq!(status_of(&err), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(hits.book_listings.load(Ordering::SeqCst), 3);

        handle.stop(true).await;
    }
}
