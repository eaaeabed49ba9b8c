use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::api::{UserDetails, UserId};
use crate::users_repository::{UserRecord, UsersRepository, UsersRepositoryError};

#[derive(Default)]
pub struct InMemoryUsersRepository {
    users: parking_lot::RwLock<HashMap<UserId, UserRecord>>,
    user_sequence_generator: AtomicI32,
}

#[async_trait::async_trait]
impl UsersRepository for InMemoryUsersRepository {
    async fn add_user(&self, user: UserRecord) -> Result<UserId, UsersRepositoryError> {
        let mut locked_users = self.users.write();
        if locked_users
            .values()
            .any(|existing| existing.details.email == user.details.email)
        {
            return Err(UsersRepositoryError::EmailAlreadyInUse(user.details.email));
        }
        let id = self.user_sequence_generator.fetch_add(1, Ordering::Relaxed);
        locked_users.insert(id, user);
        Ok(id)
    }

    async fn get_user(&self, id: UserId) -> Result<UserRecord, UsersRepositoryError> {
        self.users
            .read()
            .get(&id)
            .cloned()
            .ok_or(UsersRepositoryError::UserNotFound(id))
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<(UserId, UserRecord)>, UsersRepositoryError> {
        Ok(self
            .users
            .read()
            .iter()
            .find(|(_, user)| user.details.email == email)
            .map(|(&id, user)| (id, user.clone())))
    }

    async fn update_user(&self, id: UserId, user: UserRecord) -> Result<(), UsersRepositoryError> {
        match self.users.write().get_mut(&id) {
            Some(existing) => {
                *existing = UserRecord {
                    details: UserDetails {
                        email: existing.details.email.clone(),
                        ..user.details
                    },
                    password_hash: user.password_hash,
                };
                Ok(())
            }
            None => Err(UsersRepositoryError::UserNotFound(id)),
        }
    }

    async fn list_users(&self) -> Result<Vec<(UserId, UserDetails)>, UsersRepositoryError> {
        let mut users: Vec<_> = self
            .users
            .read()
            .iter()
            .map(|(&id, user)| (id, user.details.clone()))
            .collect();
        users.sort_by_key(|(id, _)| *id);
        Ok(users)
    }
}
