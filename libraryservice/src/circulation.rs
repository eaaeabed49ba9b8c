//! Lending desk: runs borrow records through their lifecycle and keeps book
//! stock in step with them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::{
    BookId, BorrowAdminView, BorrowId, BorrowQuery, BorrowStudentView, UserId,
};
use crate::books_repository::{BooksRepository, BooksRepositoryError};
use crate::borrow_lifecycle::{BorrowPolicy, BorrowRecord, BorrowState, LifecycleError};
use crate::borrows_repository::{BorrowFilter, BorrowsRepository, BorrowsRepositoryError};
use crate::users_repository::{UsersRepository, UsersRepositoryError};

const UNKNOWN: &str = "Unknown";

#[derive(Debug, thiserror::Error)]
pub enum CirculationError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Users(#[from] UsersRepositoryError),

    #[error(transparent)]
    Books(#[from] BooksRepositoryError),

    #[error(transparent)]
    Borrows(#[from] BorrowsRepositoryError),
}

pub struct Circulation {
    users: Arc<dyn UsersRepository>,
    books: Arc<dyn BooksRepository>,
    borrows: Arc<dyn BorrowsRepository>,
    policy: BorrowPolicy,
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

impl Circulation {
    pub fn new(
        users: Arc<dyn UsersRepository>,
        books: Arc<dyn BooksRepository>,
        borrows: Arc<dyn BorrowsRepository>,
        policy: BorrowPolicy,
    ) -> Self {
        Self {
            users,
            books,
            borrows,
            policy,
        }
    }

    pub async fn get_borrow(&self, id: BorrowId) -> Result<BorrowRecord, CirculationError> {
        Ok(self.borrows.get_borrow(id).await?)
    }

    /// Creates a pending request if the book has a copy on the shelf and the
    /// user is below the active borrow limit
    pub async fn request_borrow(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<BorrowAdminView, CirculationError> {
        self.users.get_user(user_id).await?;
        let book = self.books.get_book(book_id).await?;
        if book.available < 1 {
            return Err(BooksRepositoryError::OutOfStock(book_id).into());
        }

        let now = Utc::now();
        let record = BorrowRecord::request(user_id, book_id, now);
        let id = self
            .borrows
            .add_borrow(record.clone(), self.policy.max_active_borrows)
            .await?;
        tracing::info!(borrow_id = id, user_id, book_id, "Borrow requested");

        self.admin_view(id, &record, now).await
    }

    pub async fn approve(&self, id: BorrowId) -> Result<BorrowAdminView, CirculationError> {
        let now = Utc::now();
        let record = self.borrows.get_borrow(id).await?;
        let approved = record.approve(now, &self.policy)?;

        // availability is re-checked here, it may have changed since the request
        self.books.take_copy(record.book_id).await?;

        if let Err(err) = self
            .borrows
            .update_borrow(id, record.state, approved.clone())
            .await
        {
            if let Err(return_err) = self.books.return_copy(record.book_id).await {
                tracing::error!(
                    borrow_id = id,
                    book_id = record.book_id,
                    "Failed to give back copy after failed approval {}",
                    return_err
                );
            }
            return Err(err.into());
        }
        tracing::info!(borrow_id = id, book_id = record.book_id, "Borrow approved");

        self.admin_view(id, &approved, now).await
    }

    pub async fn reject(&self, id: BorrowId) -> Result<BorrowAdminView, CirculationError> {
        let record = self.borrows.get_borrow(id).await?;
        let rejected = record.reject()?;
        self.borrows
            .update_borrow(id, record.state, rejected.clone())
            .await?;
        tracing::info!(borrow_id = id, "Borrow rejected");

        self.admin_view(id, &rejected, Utc::now()).await
    }

    pub async fn extend(&self, id: BorrowId) -> Result<BorrowAdminView, CirculationError> {
        let now = Utc::now();
        let record = self.borrows.get_borrow(id).await?;
        let extended = record.extend(now, &self.policy)?;
        self.borrows
            .update_borrow(id, record.state, extended.clone())
            .await?;
        tracing::info!(
            borrow_id = id,
            extensions = extended.extensions,
            "Borrow extended"
        );

        self.admin_view(id, &extended, now).await
    }

    pub async fn mark_returned(&self, id: BorrowId) -> Result<BorrowAdminView, CirculationError> {
        let now = Utc::now();
        let record = self.borrows.get_borrow(id).await?;
        let returned = record.mark_returned(now)?;

        // record first, so a concurrent second return cannot give the copy back twice
        self.borrows
            .update_borrow(id, record.state, returned.clone())
            .await?;
        match self.books.return_copy(record.book_id).await {
            Ok(()) => {}
            Err(BooksRepositoryError::NotFound(book_id)) => {
                tracing::warn!(borrow_id = id, book_id, "Returned book no longer in catalog");
            }
            Err(err) => return Err(err.into()),
        }
        tracing::info!(borrow_id = id, book_id = record.book_id, "Book returned");

        self.admin_view(id, &returned, now).await
    }

    /// Hard delete, stock is left untouched
    pub async fn remove(&self, id: BorrowId) -> Result<(), CirculationError> {
        self.borrows.delete_borrow(id).await?;
        tracing::info!(borrow_id = id, "Borrow record deleted");
        Ok(())
    }

    pub async fn list_all(
        &self,
        query: BorrowQuery,
    ) -> Result<Vec<BorrowAdminView>, CirculationError> {
        let now = Utc::now();
        let filter = BorrowFilter {
            user_id: query.user_id,
            book_id: query.book_id,
            state: query.status.map(BorrowState::from_status),
        };
        let records = self.borrows.list_borrows(&filter).await?;

        let mut lookup = Lookup::default();
        let mut views = Vec::with_capacity(records.len());
        for (id, record) in records {
            // overdue and borrowing share the stored state
            if query
                .status
                .is_some_and(|status| record.status_at(now) != status)
            {
                continue;
            }
            views.push(self.build_admin_view(&mut lookup, id, &record, now).await?);
        }
        Ok(views)
    }

    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<BorrowStudentView>, CirculationError> {
        let now = Utc::now();
        let records = self
            .borrows
            .list_borrows(&BorrowFilter::for_user(user_id))
            .await?;

        let mut lookup = Lookup::default();
        let mut views = Vec::with_capacity(records.len());
        for (id, record) in records {
            let title = lookup.book_title(self, record.book_id).await?;
            views.push(BorrowStudentView {
                id,
                book_id: record.book_id,
                title: title.clone(),
                book_title: title,
                borrow_date: format_date(record.borrow_date),
                due_date: format_date(record.due_date),
                status: record.status_at(now),
                days_remaining: record.days_remaining(now),
                extended_days: record.extended_days,
                extensions: record.extensions,
            });
        }
        Ok(views)
    }

    async fn admin_view(
        &self,
        id: BorrowId,
        record: &BorrowRecord,
        now: DateTime<Utc>,
    ) -> Result<BorrowAdminView, CirculationError> {
        self.build_admin_view(&mut Lookup::default(), id, record, now)
            .await
    }

    async fn build_admin_view(
        &self,
        lookup: &mut Lookup,
        id: BorrowId,
        record: &BorrowRecord,
        now: DateTime<Utc>,
    ) -> Result<BorrowAdminView, CirculationError> {
        let title = lookup.book_title(self, record.book_id).await?;
        let (borrower_name, borrower_email) = lookup.borrower(self, record.user_id).await?;
        Ok(BorrowAdminView {
            id,
            user_id: record.user_id,
            book_id: record.book_id,
            title: title.clone(),
            book_title: title,
            borrower_name,
            borrower_email,
            borrow_date: format_date(record.borrow_date),
            due_date: format_date(record.due_date),
            status: record.status_at(now),
            extended_days: record.extended_days,
            extensions: record.extensions,
        })
    }
}

/// Per-listing cache of referenced books and users
#[derive(Default)]
struct Lookup {
    titles: HashMap<BookId, String>,
    borrowers: HashMap<UserId, (String, String)>,
}

impl Lookup {
    async fn book_title(
        &mut self,
        circulation: &Circulation,
        book_id: BookId,
    ) -> Result<String, CirculationError> {
        if let Some(title) = self.titles.get(&book_id) {
            return Ok(title.clone());
        }
        let title = match circulation.books.get_book(book_id).await {
            Ok(book) => book.title,
            Err(BooksRepositoryError::NotFound(_)) => UNKNOWN.to_string(),
            Err(err) => return Err(err.into()),
        };
        self.titles.insert(book_id, title.clone());
        Ok(title)
    }

    async fn borrower(
        &mut self,
        circulation: &Circulation,
        user_id: UserId,
    ) -> Result<(String, String), CirculationError> {
        if let Some(borrower) = self.borrowers.get(&user_id) {
            return Ok(borrower.clone());
        }
        let borrower = match circulation.users.get_user(user_id).await {
            Ok(user) => (user.details.name, user.details.email),
            Err(UsersRepositoryError::UserNotFound(_)) => (UNKNOWN.to_string(), UNKNOWN.to_string()),
            Err(err) => return Err(err.into()),
        };
        self.borrowers.insert(user_id, borrower.clone());
        Ok(borrower)
    }
}
