use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio_postgres::{Client, Row, Statement};

use crate::api::BorrowId;
use crate::borrow_lifecycle::{BorrowRecord, BorrowState};
use crate::borrows_repository::{BorrowFilter, BorrowsRepository, BorrowsRepositoryError};

pub struct PostgresBorrowsRepository {
    client: Arc<Client>,
}

impl PostgresBorrowsRepository {
    pub async fn init(client: Arc<Client>) -> anyhow::Result<Self> {
        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS borrows (
            id              SERIAL PRIMARY KEY,
            user_id         INTEGER NOT NULL,
            book_id         INTEGER NOT NULL,
            status          TEXT NOT NULL,
            params          JSONB
            );
        CREATE INDEX IF NOT EXISTS borrows_user_id_idx ON borrows (user_id);
        ",
            )
            .await
            .context("Failed to setup borrows table")?;
        Ok(Self { client })
    }
}

fn active_states() -> Vec<&'static str> {
    BorrowState::ACTIVE.iter().map(|state| state.as_str()).collect()
}

fn borrow_from_row(row: &Row) -> Result<(BorrowId, BorrowRecord), BorrowsRepositoryError> {
    let id: BorrowId = row.try_get(0)?;
    let params: serde_json::Value = row.try_get(1)?;
    Ok((id, serde_json::from_value(params)?))
}

#[async_trait::async_trait]
impl BorrowsRepository for PostgresBorrowsRepository {
    async fn add_borrow(
        &self,
        record: BorrowRecord,
        active_limit: usize,
    ) -> Result<BorrowId, BorrowsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO borrows (user_id, book_id, status, params)
                 SELECT ($1)::INTEGER, ($2)::INTEGER, ($3)::TEXT, ($4)::JSONB
                 WHERE (SELECT COUNT(*) FROM borrows
                        WHERE user_id = ($1)::INTEGER AND status = ANY(($5)::TEXT[]))
                       < ($6)::BIGINT
                 RETURNING id",
            )
            .await?;

        let rows = self
            .client
            .query(
                &stmt,
                &[
                    &record.user_id,
                    &record.book_id,
                    &record.state.as_str(),
                    &json!(record),
                    &active_states(),
                    &(active_limit as i64),
                ],
            )
            .await?;

        match rows.first() {
            Some(row) => Ok(row.try_get(0)?),
            None => Err(BorrowsRepositoryError::ActiveLimitReached(active_limit)),
        }
    }

    async fn get_borrow(&self, id: BorrowId) -> Result<BorrowRecord, BorrowsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT params FROM borrows WHERE id = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&id]).await?;

        let params: serde_json::Value = rows
            .first()
            .ok_or(BorrowsRepositoryError::NotFound(id))?
            .try_get(0)?;

        Ok(serde_json::from_value(params)?)
    }

    async fn update_borrow(
        &self,
        id: BorrowId,
        expected: BorrowState,
        record: BorrowRecord,
    ) -> Result<(), BorrowsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE borrows SET status = ($1), params = ($2)
                 WHERE id = ($3) AND status = ($4)
                 RETURNING id",
            )
            .await?;

        let rows = self
            .client
            .query(
                &stmt,
                &[&record.state.as_str(), &json!(record), &id, &expected.as_str()],
            )
            .await?;

        if rows.is_empty() {
            self.get_borrow(id).await?;
            Err(BorrowsRepositoryError::StateChanged { id, expected })
        } else {
            Ok(())
        }
    }

    async fn delete_borrow(&self, id: BorrowId) -> Result<(), BorrowsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM borrows WHERE id = ($1) RETURNING id")
            .await?;
        let rows = self.client.query(&stmt, &[&id]).await?;
        if rows.is_empty() {
            Err(BorrowsRepositoryError::NotFound(id))
        } else {
            Ok(())
        }
    }

    async fn list_borrows(
        &self,
        filter: &BorrowFilter,
    ) -> Result<Vec<(BorrowId, BorrowRecord)>, BorrowsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "SELECT id, params FROM borrows
                 WHERE (($1)::INTEGER IS NULL OR user_id = ($1))
                   AND (($2)::INTEGER IS NULL OR book_id = ($2))
                   AND (($3)::TEXT IS NULL OR status = ($3))
                 ORDER BY id DESC",
            )
            .await?;

        let status = filter.state.map(|state| state.as_str());
        let rows = self
            .client
            .query(&stmt, &[&filter.user_id, &filter.book_id, &status])
            .await?;

        rows.iter().map(borrow_from_row).collect()
    }
}

#[cfg(test)]
mod tests_postgres_borrows_repository {
    use chrono::Utc;
    use serial_test::file_serial;

    use crate::api::UserId;
    use crate::borrow_lifecycle::BorrowPolicy;
    use crate::postgres::test_support::start_postgres_container;

    use super::*;

    async fn active_records(repository: &PostgresBorrowsRepository, user_id: UserId) -> usize {
        repository
            .list_borrows(&BorrowFilter::for_user(user_id))
            .await
            .unwrap()
            .iter()
            .filter(|(_, record)| record.is_active())
            .count()
    }

    #[tokio::test]
    #[file_serial(key, path => "../.pgtestslock")]
    /// Simple test to cover borrow record management
    /// Combined into big unit test to avoid duplicate setup
    /// 1. Adds records up to the active limit, the next one is rejected
    /// 2. Approves a record with compare-and-set, stale update is refused
    /// 3. Lists with filters, newest first
    /// 4. Deletes a record
    async fn test_borrow_management() {
        let (_container, client) = start_postgres_container().await;
        let repository = PostgresBorrowsRepository::init(client).await.unwrap();
        let now = Utc::now();
        let user_id: UserId = 3;

        let mut ids = vec![];
        for book_id in 0..3 {
            ids.push(
                repository
                    .add_borrow(BorrowRecord::request(user_id, book_id, now), 3)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(active_records(&repository, user_id).await, 3);
        assert!(matches!(
            repository
                .add_borrow(BorrowRecord::request(user_id, 10, now), 3)
                .await,
            Err(BorrowsRepositoryError::ActiveLimitReached(3))
        ));

        let pending = repository.get_borrow(ids[1]).await.unwrap();
        let approved = pending.approve(now, &BorrowPolicy::default()).unwrap();
        repository
            .update_borrow(ids[1], BorrowState::PendingApproval, approved.clone())
            .await
            .unwrap();
        assert_eq!(repository.get_borrow(ids[1]).await.unwrap(), approved);

        assert!(matches!(
            repository
                .update_borrow(ids[1], BorrowState::PendingApproval, approved.clone())
                .await,
            Err(BorrowsRepositoryError::StateChanged { .. })
        ));
        assert!(matches!(
            repository
                .update_borrow(9999, BorrowState::PendingApproval, approved.clone())
                .await,
            Err(BorrowsRepositoryError::NotFound(..))
        ));

        let borrowing = repository
            .list_borrows(&BorrowFilter {
                state: Some(BorrowState::Borrowing),
                ..BorrowFilter::for_user(user_id)
            })
            .await
            .unwrap();
        assert_eq!(borrowing.len(), 1);
        assert_eq!(borrowing[0].0, ids[1]);

        let listed: Vec<_> = repository
            .list_borrows(&BorrowFilter::for_user(user_id))
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(listed, vec![ids[2], ids[1], ids[0]]);

        repository.delete_borrow(ids[0]).await.unwrap();
        assert_eq!(active_records(&repository, user_id).await, 2);
        assert!(matches!(
            repository.get_borrow(ids[0]).await,
            Err(BorrowsRepositoryError::NotFound(..))
        ));
    }
}
