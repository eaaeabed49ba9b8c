pub use in_memory_borrows_repository::InMemoryBorrowsRepository;
pub use postgres_borrows_repository::PostgresBorrowsRepository;

use crate::api::{BookId, BorrowId, UserId};
use crate::borrow_lifecycle::{BorrowRecord, BorrowState};

mod in_memory_borrows_repository;
mod postgres_borrows_repository;

#[derive(Debug, thiserror::Error)]
pub enum BorrowsRepositoryError {
    #[error("Borrow record {0} not found")]
    NotFound(BorrowId),

    #[error("You have reached the limit of {0} active borrowings")]
    ActiveLimitReached(usize),

    #[error("Borrow record {id} is no longer {expected}")]
    StateChanged { id: BorrowId, expected: BorrowState },

    #[error("Failed to deserialize borrow record: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BorrowFilter {
    pub user_id: Option<UserId>,
    pub book_id: Option<BookId>,
    pub state: Option<BorrowState>,
}

impl BorrowFilter {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &BorrowRecord) -> bool {
        self.user_id.map_or(true, |user_id| record.user_id == user_id)
            && self.book_id.map_or(true, |book_id| record.book_id == book_id)
            && self.state.map_or(true, |state| record.state == state)
    }
}

#[async_trait::async_trait]
pub trait BorrowsRepository: Send + Sync {
    /// Inserts the record unless its user already has `active_limit` active records.
    /// Counting and inserting happen as one step
    async fn add_borrow(
        &self,
        record: BorrowRecord,
        active_limit: usize,
    ) -> Result<BorrowId, BorrowsRepositoryError>;

    async fn get_borrow(&self, id: BorrowId) -> Result<BorrowRecord, BorrowsRepositoryError>;

    /// Replaces the record only if its stored state is still `expected`
    async fn update_borrow(
        &self,
        id: BorrowId,
        expected: BorrowState,
        record: BorrowRecord,
    ) -> Result<(), BorrowsRepositoryError>;

    async fn delete_borrow(&self, id: BorrowId) -> Result<(), BorrowsRepositoryError>;

    /// Lists records matching the filter, newest first
    async fn list_borrows(
        &self,
        filter: &BorrowFilter,
    ) -> Result<Vec<(BorrowId, BorrowRecord)>, BorrowsRepositoryError>;
}
