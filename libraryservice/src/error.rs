use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::api::MessageResponse;
use crate::books_repository::BooksRepositoryError;
use crate::borrow_lifecycle::LifecycleError;
use crate::borrows_repository::BorrowsRepositoryError;
use crate::circulation::CirculationError;
use crate::users_repository::UsersRepositoryError;

/// Error returned by handlers, rendered as `{"message": ...}` with a matching status code
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Server error")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal(err.into())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(err) = self {
            tracing::error!("Request failed {:#}", err);
        }
        HttpResponse::build(self.status_code()).json(MessageResponse::new(self.to_string()))
    }
}

impl From<UsersRepositoryError> for ApiError {
    fn from(err: UsersRepositoryError) -> Self {
        match err {
            UsersRepositoryError::UserNotFound(_) => ApiError::NotFound("User not found".to_string()),
            UsersRepositoryError::EmailAlreadyInUse(_) => {
                ApiError::Conflict("Email already in use".to_string())
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<BooksRepositoryError> for ApiError {
    fn from(err: BooksRepositoryError) -> Self {
        match err {
            BooksRepositoryError::NotFound(_) => ApiError::NotFound("Book not found".to_string()),
            err @ (BooksRepositoryError::OutOfStock(_)
            | BooksRepositoryError::InvalidStock { .. }) => ApiError::BadRequest(err.to_string()),
            other => ApiError::internal(other),
        }
    }
}

impl From<BorrowsRepositoryError> for ApiError {
    fn from(err: BorrowsRepositoryError) -> Self {
        match err {
            BorrowsRepositoryError::NotFound(_) => ApiError::NotFound("Not found".to_string()),
            err @ BorrowsRepositoryError::ActiveLimitReached(_) => {
                ApiError::BadRequest(err.to_string())
            }
            err @ BorrowsRepositoryError::StateChanged { .. } => ApiError::Conflict(err.to_string()),
            other => ApiError::internal(other),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<CirculationError> for ApiError {
    fn from(err: CirculationError) -> Self {
        match err {
            CirculationError::Lifecycle(err) => err.into(),
            CirculationError::Users(err) => err.into(),
            CirculationError::Books(err) => err.into(),
            CirculationError::Borrows(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod api_error_tests {
    use actix_web::body::to_bytes;

    use super::*;

    #[actix_web::test]
    async fn renders_message_with_status() {
        let response = ApiError::from(BorrowsRepositoryError::ActiveLimitReached(3)).error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body()).await.unwrap();
        let message: MessageResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            message.message,
            "You have reached the limit of 3 active borrowings"
        );
    }

    #[actix_web::test]
    async fn internal_errors_hide_details() {
        let response = ApiError::internal(anyhow::anyhow!("connection reset")).error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body()).await.unwrap();
        let message: MessageResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(message.message, "Server error");
    }

    #[test]
    fn repository_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(UsersRepositoryError::EmailAlreadyInUse("a@b.c".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(BooksRepositoryError::NotFound(1)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(BooksRepositoryError::OutOfStock(1)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(LifecycleError::AlreadyReturned).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
