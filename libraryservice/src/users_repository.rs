pub use in_memory_users_repository::InMemoryUsersRepository;
pub use postgres_users_repository::PostgresUsersRepository;

use crate::api::{UserDetails, UserId};

mod in_memory_users_repository;
mod postgres_users_repository;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
/// Account as persisted, including the bcrypt password hash
pub struct UserRecord {
    #[serde(flatten)]
    pub details: UserDetails,
    pub password_hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UsersRepositoryError {
    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Email {0} already in use")]
    EmailAlreadyInUse(String),

    #[error("Failed to deserialize user: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait UsersRepository: Send + Sync {
    /// Adds user, emails are unique
    async fn add_user(&self, user: UserRecord) -> Result<UserId, UsersRepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<UserRecord, UsersRepositoryError>;

    /// Looks the user up by exact (already normalized) email
    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<(UserId, UserRecord)>, UsersRepositoryError>;

    /// Replaces stored user, the email is not allowed to change
    async fn update_user(&self, id: UserId, user: UserRecord) -> Result<(), UsersRepositoryError>;

    async fn list_users(&self) -> Result<Vec<(UserId, UserDetails)>, UsersRepositoryError>;
}
