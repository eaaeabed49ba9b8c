use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::api::{BookDetails, BookDetailsPatch, BookId};
use crate::books_repository::{
    merge_patch, validate_stock, BookFilter, BooksRepository, BooksRepositoryError,
};

#[derive(Default)]
pub struct InMemoryBooksRepository {
    book_sequence_generator: AtomicI32,
    books: parking_lot::RwLock<HashMap<BookId, BookDetails>>,
}

#[async_trait::async_trait]
impl BooksRepository for InMemoryBooksRepository {
    async fn add_book(&self, details: BookDetails) -> Result<BookId, BooksRepositoryError> {
        validate_stock(&details)?;
        let id = self.book_sequence_generator.fetch_add(1, Ordering::Relaxed);
        self.books.write().insert(id, details);
        Ok(id)
    }

    async fn update_book(
        &self,
        book_id: BookId,
        patch: BookDetailsPatch,
    ) -> Result<BookDetails, BooksRepositoryError> {
        let mut locked_books = self.books.write();
        let book = locked_books
            .get_mut(&book_id)
            .ok_or(BooksRepositoryError::NotFound(book_id))?;
        let merged = merge_patch(book, &patch)?;
        validate_stock(&merged)?;
        *book = merged.clone();
        Ok(merged)
    }

    async fn get_book(&self, book_id: BookId) -> Result<BookDetails, BooksRepositoryError> {
        self.books
            .read()
            .get(&book_id)
            .cloned()
            .ok_or(BooksRepositoryError::NotFound(book_id))
    }

    async fn list_books(
        &self,
        filter: &BookFilter,
    ) -> Result<Vec<(BookId, BookDetails)>, BooksRepositoryError> {
        let mut books: Vec<_> = self
            .books
            .read()
            .iter()
            .filter(|(_, details)| filter.matches(details))
            .map(|(&book_id, details)| (book_id, details.clone()))
            .collect();
        books.sort_by(|(a, _), (b, _)| b.cmp(a));
        Ok(books)
    }

    async fn delete_book(&self, book_id: BookId) -> Result<(), BooksRepositoryError> {
        self.books
            .write()
            .remove(&book_id)
            .map(|_| ())
            .ok_or(BooksRepositoryError::NotFound(book_id))
    }

    async fn take_copy(&self, book_id: BookId) -> Result<(), BooksRepositoryError> {
        let mut locked_books = self.books.write();
        let book = locked_books
            .get_mut(&book_id)
            .ok_or(BooksRepositoryError::NotFound(book_id))?;
        if book.available < 1 {
            return Err(BooksRepositoryError::OutOfStock(book_id));
        }
        book.available -= 1;
        Ok(())
    }

    async fn return_copy(&self, book_id: BookId) -> Result<(), BooksRepositoryError> {
        let mut locked_books = self.books.write();
        let book = locked_books
            .get_mut(&book_id)
            .ok_or(BooksRepositoryError::NotFound(book_id))?;
        book.available = (book.available + 1).min(book.stock);
        Ok(())
    }
}
