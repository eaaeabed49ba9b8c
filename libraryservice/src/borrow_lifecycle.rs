//! State machine of a single borrow record.
//!
//! Every transition is a pure function of the current record, the current
//! time and the [`BorrowPolicy`]. Transitions return a new record so callers
//! can persist it with a compare-and-set on the previous [`BorrowState`].

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{BookId, BorrowStatus, UserId};

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// State persisted for a borrow record. Overdue is derived, see [`BorrowRecord::status_at`]
pub enum BorrowState {
    #[serde(rename = "Pending Approval")]
    PendingApproval,
    Borrowing,
    Returned,
    Rejected,
}

impl BorrowState {
    /// States counted towards the per-user limit of active borrows
    pub const ACTIVE: [BorrowState; 2] = [BorrowState::PendingApproval, BorrowState::Borrowing];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BorrowState::PendingApproval => "Pending Approval",
            BorrowState::Borrowing => "Borrowing",
            BorrowState::Returned => "Returned",
            BorrowState::Rejected => "Rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending Approval" => Some(BorrowState::PendingApproval),
            "Borrowing" => Some(BorrowState::Borrowing),
            "Returned" => Some(BorrowState::Returned),
            "Rejected" => Some(BorrowState::Rejected),
            _ => None,
        }
    }

    /// Stored state backing a display status, overdue records are stored as borrowing
    pub fn from_status(status: BorrowStatus) -> Self {
        match status {
            BorrowStatus::PendingApproval => BorrowState::PendingApproval,
            BorrowStatus::Borrowing | BorrowStatus::Overdue => BorrowState::Borrowing,
            BorrowStatus::Returned => BorrowState::Returned,
            BorrowStatus::Rejected => BorrowState::Rejected,
        }
    }
}

impl fmt::Display for BorrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Limits and periods applied to borrow records
pub struct BorrowPolicy {
    pub max_active_borrows: usize,
    pub loan_days: i64,
    pub extension_days: i64,
    pub max_extensions: u32,
}

impl Default for BorrowPolicy {
    fn default() -> Self {
        Self {
            max_active_borrows: 3,
            loan_days: 14,
            extension_days: 7,
            max_extensions: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Can only approve or decline pending requests, this one is {0}")]
    NotPending(BorrowState),

    #[error("Only borrowed books can be extended or returned, this one is {0}")]
    NotBorrowing(BorrowState),

    #[error("This book has already been returned")]
    AlreadyReturned,

    #[error("Extension limit of {0} reached")]
    ExtensionLimitReached(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRecord {
    pub user_id: UserId,
    pub book_id: BookId,
    pub state: BorrowState,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub borrow_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub returned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extended_days: u32,
    #[serde(default)]
    pub extensions: u32,
}

impl BorrowRecord {
    pub fn request(user_id: UserId, book_id: BookId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            book_id,
            state: BorrowState::PendingApproval,
            requested_at: now,
            borrow_date: None,
            due_date: None,
            returned_at: None,
            extended_days: 0,
            extensions: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Pending -> Borrowing. Stock is taken by the caller
    pub fn approve(
        &self,
        now: DateTime<Utc>,
        policy: &BorrowPolicy,
    ) -> Result<BorrowRecord, LifecycleError> {
        if self.state != BorrowState::PendingApproval {
            return Err(LifecycleError::NotPending(self.state));
        }
        Ok(BorrowRecord {
            state: BorrowState::Borrowing,
            borrow_date: Some(now),
            due_date: Some(now + Duration::days(policy.loan_days)),
            ..self.clone()
        })
    }

    /// Pending -> Rejected
    pub fn reject(&self) -> Result<BorrowRecord, LifecycleError> {
        if self.state != BorrowState::PendingApproval {
            return Err(LifecycleError::NotPending(self.state));
        }
        Ok(BorrowRecord {
            state: BorrowState::Rejected,
            ..self.clone()
        })
    }

    /// Borrowing (or overdue) -> Borrowing with the due date pushed back
    pub fn extend(
        &self,
        now: DateTime<Utc>,
        policy: &BorrowPolicy,
    ) -> Result<BorrowRecord, LifecycleError> {
        if self.state != BorrowState::Borrowing {
            return Err(LifecycleError::NotBorrowing(self.state));
        }
        if self.extensions >= policy.max_extensions {
            return Err(LifecycleError::ExtensionLimitReached(policy.max_extensions));
        }
        let due = self.due_date.unwrap_or(now) + Duration::days(policy.extension_days);
        Ok(BorrowRecord {
            due_date: Some(due),
            extended_days: self.extended_days + policy.extension_days as u32,
            extensions: self.extensions + 1,
            ..self.clone()
        })
    }

    /// Borrowing (or overdue) -> Returned. The copy is given back by the caller
    pub fn mark_returned(&self, now: DateTime<Utc>) -> Result<BorrowRecord, LifecycleError> {
        match self.state {
            BorrowState::Borrowing => Ok(BorrowRecord {
                state: BorrowState::Returned,
                returned_at: Some(now),
                ..self.clone()
            }),
            BorrowState::Returned => Err(LifecycleError::AlreadyReturned),
            other => Err(LifecycleError::NotBorrowing(other)),
        }
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.state == BorrowState::Borrowing && self.due_date.is_some_and(|due| now > due)
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> BorrowStatus {
        match self.state {
            BorrowState::PendingApproval => BorrowStatus::PendingApproval,
            BorrowState::Borrowing if self.is_overdue_at(now) => BorrowStatus::Overdue,
            BorrowState::Borrowing => BorrowStatus::Borrowing,
            BorrowState::Returned => BorrowStatus::Returned,
            BorrowState::Rejected => BorrowStatus::Rejected,
        }
    }

    /// Whole days left until the due date, rounded up. Negative once overdue
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.state != BorrowState::Borrowing {
            return None;
        }
        self.due_date.map(|due| {
            let seconds = (due - now).num_seconds() as f64;
            (seconds / SECONDS_PER_DAY).ceil() as i64
        })
    }
}
