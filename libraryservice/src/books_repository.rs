pub use in_memory_books_repository::InMemoryBooksRepository;
pub use postgres_books_repository::PostgresBooksRepository;

use serde_json::json;

use crate::api::{BookDetails, BookDetailsPatch, BookId, BookQuery};

mod in_memory_books_repository;
mod postgres_books_repository;

#[derive(thiserror::Error, Debug)]
pub enum BooksRepositoryError {
    #[error("Book {0} not found")]
    NotFound(BookId),

    #[error("This book is out of stock, please choose another book")]
    OutOfStock(BookId),

    #[error("Available copies ({available}) cannot exceed stock ({stock})")]
    InvalidStock { stock: u32, available: u32 },

    #[error("Failed to deserialize book: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Normalized catalog filter
pub struct BookFilter {
    /// Case-insensitive substring of title or author
    pub keyword: Option<String>,
    /// Lower-cased category
    pub category: Option<String>,
}

impl From<BookQuery> for BookFilter {
    fn from(query: BookQuery) -> Self {
        let keyword = query
            .keyword
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty());
        let category = query
            .category
            .map(|category| normalize_category(&category))
            .filter(|category| !category.is_empty() && category != "all");
        Self { keyword, category }
    }
}

impl BookFilter {
    pub fn matches(&self, details: &BookDetails) -> bool {
        let keyword_matches = self.keyword.as_ref().map_or(true, |keyword| {
            let keyword = keyword.to_lowercase();
            details.title.to_lowercase().contains(&keyword)
                || details.author.to_lowercase().contains(&keyword)
        });
        let category_matches = self
            .category
            .as_ref()
            .map_or(true, |category| &details.category == category);
        keyword_matches && category_matches
    }
}

pub fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

/// Checks `available <= stock`, negative values are unrepresentable
pub fn validate_stock(details: &BookDetails) -> Result<(), BooksRepositoryError> {
    if details.available > details.stock {
        Err(BooksRepositoryError::InvalidStock {
            stock: details.stock,
            available: details.available,
        })
    } else {
        Ok(())
    }
}

/// Applies a JSON merge patch to stored details
pub fn merge_patch(
    details: &BookDetails,
    patch: &BookDetailsPatch,
) -> Result<BookDetails, BooksRepositoryError> {
    let mut merged = json!(details);
    json_patch::merge(&mut merged, &json!(patch));
    Ok(serde_json::from_value(merged)?)
}

#[async_trait::async_trait]
pub trait BooksRepository: Send + Sync {
    /// Adds book to repository, returns an id assigned to the book
    async fn add_book(&self, details: BookDetails) -> Result<BookId, BooksRepositoryError>;
    /// Merges patch into the stored book, the stock invariant is checked on the merged result
    async fn update_book(
        &self,
        book_id: BookId,
        patch: BookDetailsPatch,
    ) -> Result<BookDetails, BooksRepositoryError>;
    /// Retrieves details of the book from repository
    async fn get_book(&self, book_id: BookId) -> Result<BookDetails, BooksRepositoryError>;
    /// Lists books matching the filter, newest first
    async fn list_books(
        &self,
        filter: &BookFilter,
    ) -> Result<Vec<(BookId, BookDetails)>, BooksRepositoryError>;
    async fn delete_book(&self, book_id: BookId) -> Result<(), BooksRepositoryError>;
    /// Atomically lends one copy, fails with OutOfStock when nothing is available
    async fn take_copy(&self, book_id: BookId) -> Result<(), BooksRepositoryError>;
    /// Atomically gives one copy back, never raising available above stock
    async fn return_copy(&self, book_id: BookId) -> Result<(), BooksRepositoryError>;
}
