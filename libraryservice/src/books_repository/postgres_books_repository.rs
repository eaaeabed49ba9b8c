use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio_postgres::{Client, Row, Statement};

use crate::api::{BookDetails, BookDetailsPatch, BookId};
use crate::books_repository::{
    merge_patch, validate_stock, BookFilter, BooksRepository, BooksRepositoryError,
};

pub struct PostgresBooksRepository {
    client: Arc<Client>,
}

impl PostgresBooksRepository {
    pub async fn init(client: Arc<Client>) -> anyhow::Result<Self> {
        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS books (
            id              SERIAL PRIMARY KEY,
            params          JSONB
            )
        ",
            )
            .await
            .context("Failed to setup books table")?;
        Ok(Self { client })
    }
}

fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn book_from_row(row: &Row) -> Result<(BookId, BookDetails), BooksRepositoryError> {
    let book_id: BookId = row.try_get(0)?;
    let params: serde_json::Value = row.try_get(1)?;
    Ok((book_id, serde_json::from_value(params)?))
}

#[async_trait::async_trait]
impl BooksRepository for PostgresBooksRepository {
    async fn add_book(&self, details: BookDetails) -> Result<BookId, BooksRepositoryError> {
        validate_stock(&details)?;
        let stmt: Statement = self
            .client
            .prepare("INSERT INTO books (params) VALUES ($1) RETURNING id")
            .await?;

        let rows = self.client.query(&stmt, &[&json!(details)]).await?;

        let book_id: BookId = rows
            .first()
            .ok_or_else(|| BooksRepositoryError::Other("Id not returned".to_string()))?
            .try_get(0)?;

        Ok(book_id)
    }

    async fn update_book(
        &self,
        book_id: BookId,
        patch: BookDetailsPatch,
    ) -> Result<BookDetails, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE books SET params = params || ($1)::JSONB
                 WHERE id = ($2)
                   AND ((params || ($1)::JSONB)->>'available')::INT
                       <= ((params || ($1)::JSONB)->>'stock')::INT
                 RETURNING params",
            )
            .await?;

        let rows = self.client.query(&stmt, &[&json!(patch), &book_id]).await?;

        match rows.first() {
            Some(row) => {
                let params: serde_json::Value = row.try_get(0)?;
                Ok(serde_json::from_value(params)?)
            }
            None => {
                // either missing or the merged stock is invalid
                let current = self.get_book(book_id).await?;
                validate_stock(&merge_patch(&current, &patch)?)?;
                Err(BooksRepositoryError::Other(format!(
                    "Book {} changed during update",
                    book_id
                )))
            }
        }
    }

    async fn get_book(&self, book_id: BookId) -> Result<BookDetails, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT params FROM books WHERE id = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&book_id]).await?;

        let details: serde_json::Value = rows
            .first()
            .ok_or(BooksRepositoryError::NotFound(book_id))?
            .try_get(0)?;

        Ok(serde_json::from_value(details)?)
    }

    async fn list_books(
        &self,
        filter: &BookFilter,
    ) -> Result<Vec<(BookId, BookDetails)>, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "SELECT id, params FROM books
                 WHERE (($1)::TEXT IS NULL
                        OR params->>'title' ILIKE ($1)
                        OR params->>'author' ILIKE ($1))
                   AND (($2)::TEXT IS NULL OR params->>'category' = ($2))
                 ORDER BY id DESC",
            )
            .await?;

        let pattern = filter.keyword.as_deref().map(like_pattern);
        let rows = self
            .client
            .query(&stmt, &[&pattern, &filter.category])
            .await?;

        rows.iter().map(book_from_row).collect()
    }

    async fn delete_book(&self, book_id: BookId) -> Result<(), BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM books WHERE id = ($1) RETURNING id")
            .await?;
        let rows = self.client.query(&stmt, &[&book_id]).await?;
        if rows.is_empty() {
            Err(BooksRepositoryError::NotFound(book_id))
        } else {
            Ok(())
        }
    }

    async fn take_copy(&self, book_id: BookId) -> Result<(), BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE books
                 SET params = jsonb_set(params, '{available}',
                                        to_jsonb((params->>'available')::INT - 1))
                 WHERE id = ($1) AND (params->>'available')::INT >= 1
                 RETURNING id",
            )
            .await?;

        let rows = self.client.query(&stmt, &[&book_id]).await?;
        if rows.is_empty() {
            self.get_book(book_id).await?;
            Err(BooksRepositoryError::OutOfStock(book_id))
        } else {
            Ok(())
        }
    }

    async fn return_copy(&self, book_id: BookId) -> Result<(), BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE books
                 SET params = jsonb_set(params, '{available}',
                                        to_jsonb(LEAST((params->>'available')::INT + 1,
                                                       (params->>'stock')::INT)))
                 WHERE id = ($1)
                 RETURNING id",
            )
            .await?;

        let rows = self.client.query(&stmt, &[&book_id]).await?;
        if rows.is_empty() {
            Err(BooksRepositoryError::NotFound(book_id))
        } else {
            Ok(())
        }
    }
}
