use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::api::{BorrowId, UserId};
use crate::borrow_lifecycle::{BorrowRecord, BorrowState};
use crate::borrows_repository::{BorrowFilter, BorrowsRepository, BorrowsRepositoryError};

#[derive(Default)]
pub struct InMemoryBorrowsRepository {
    borrow_sequence_generator: AtomicI32,
    borrows: parking_lot::RwLock<HashMap<BorrowId, BorrowRecord>>,
}

fn active_count(borrows: &HashMap<BorrowId, BorrowRecord>, user_id: UserId) -> usize {
    borrows
        .values()
        .filter(|record| record.user_id == user_id && record.is_active())
        .count()
}

#[async_trait::async_trait]
impl BorrowsRepository for InMemoryBorrowsRepository {
    async fn add_borrow(
        &self,
        record: BorrowRecord,
        active_limit: usize,
    ) -> Result<BorrowId, BorrowsRepositoryError> {
        let mut locked_borrows = self.borrows.write();
        if active_count(&locked_borrows, record.user_id) >= active_limit {
            return Err(BorrowsRepositoryError::ActiveLimitReached(active_limit));
        }
        let id = self
            .borrow_sequence_generator
            .fetch_add(1, Ordering::Relaxed);
        locked_borrows.insert(id, record);
        Ok(id)
    }

    async fn get_borrow(&self, id: BorrowId) -> Result<BorrowRecord, BorrowsRepositoryError> {
        self.borrows
            .read()
            .get(&id)
            .cloned()
            .ok_or(BorrowsRepositoryError::NotFound(id))
    }

    async fn update_borrow(
        &self,
        id: BorrowId,
        expected: BorrowState,
        record: BorrowRecord,
    ) -> Result<(), BorrowsRepositoryError> {
        let mut locked_borrows = self.borrows.write();
        let stored = locked_borrows
            .get_mut(&id)
            .ok_or(BorrowsRepositoryError::NotFound(id))?;
        if stored.state != expected {
            return Err(BorrowsRepositoryError::StateChanged { id, expected });
        }
        *stored = record;
        Ok(())
    }

    async fn delete_borrow(&self, id: BorrowId) -> Result<(), BorrowsRepositoryError> {
        self.borrows
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(BorrowsRepositoryError::NotFound(id))
    }

    async fn list_borrows(
        &self,
        filter: &BorrowFilter,
    ) -> Result<Vec<(BorrowId, BorrowRecord)>, BorrowsRepositoryError> {
        let mut borrows: Vec<_> = self
            .borrows
            .read()
            .iter()
            .filter(|(_, record)| filter.matches(record))
            .map(|(&id, record)| (id, record.clone()))
            .collect();
        borrows.sort_by(|(a, _), (b, _)| b.cmp(a));
        Ok(borrows)
    }
}

#[cfg(test)]
mod tests_in_memory_borrows_repository {
    use chrono::Utc;

    use crate::borrow_lifecycle::BorrowPolicy;

    use super::*;

    async fn active_records(repository: &InMemoryBorrowsRepository, user_id: UserId) -> usize {
        repository
            .list_borrows(&BorrowFilter::for_user(user_id))
            .await
            .unwrap()
            .iter()
            .filter(|(_, record)| record.is_active())
            .count()
    }

    #[tokio::test]
    /// Simple test to cover borrow record management
    /// Combined into big unit test to avoid duplicate setup
    /// 1. Adds records up to the active limit, the next one is rejected
    /// 2. Rejecting a record frees a slot
    /// 3. Compare-and-set refuses stale updates
    /// 4. Lists with filters, newest first
    /// 5. Deletes a record
    async fn test_borrow_management() {
        let repository = InMemoryBorrowsRepository::default();
        let now = Utc::now();
        let user_id: UserId = 7;

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

        let over_limit = repository
            .add_borrow(BorrowRecord::request(user_id, 10, now), 3)
            .await;
        assert!(matches!(
            over_limit,
            Err(BorrowsRepositoryError::ActiveLimitReached(3))
        ));

        // other users are not affected
        repository
            .add_borrow(BorrowRecord::request(user_id + 1, 10, now), 3)
            .await
            .unwrap();

        let pending = repository.get_borrow(ids[0]).await.unwrap();
        let rejected = pending.reject().unwrap();
        repository
            .update_borrow(ids[0], BorrowState::PendingApproval, rejected.clone())
            .await
            .unwrap();
        assert_eq!(active_records(&repository, user_id).await, 2);

        let stale = repository
            .update_borrow(
                ids[0],
                BorrowState::PendingApproval,
                pending.approve(now, &BorrowPolicy::default()).unwrap(),
            )
            .await;
        assert!(matches!(
            stale,
            Err(BorrowsRepositoryError::StateChanged { .. })
        ));
        assert_eq!(repository.get_borrow(ids[0]).await.unwrap(), rejected);

        repository
            .add_borrow(BorrowRecord::request(user_id, 11, now), 3)
            .await
            .unwrap();

        let listed: Vec<_> = repository
            .list_borrows(&BorrowFilter::for_user(user_id))
            .await
            .unwrap()
            .into_iter()
            .map(|(_, record)| record.book_id)
            .collect();
        assert_eq!(listed, vec![11, 2, 1, 0]);

        let rejected_only = repository
            .list_borrows(&BorrowFilter {
                state: Some(BorrowState::Rejected),
                ..BorrowFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(rejected_only.len(), 1);
        assert_eq!(rejected_only[0].0, ids[0]);

        repository.delete_borrow(ids[0]).await.unwrap();
        assert!(matches!(
            repository.get_borrow(ids[0]).await,
            Err(BorrowsRepositoryError::NotFound(..))
        ));
        assert!(matches!(
            repository.delete_borrow(ids[0]).await,
            Err(BorrowsRepositoryError::NotFound(..))
        ));
    }
}
