use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio_postgres::{Client, Statement};

use crate::api::{UserDetails, UserId};
use crate::postgres::is_unique_violation;
use crate::users_repository::{UserRecord, UsersRepository, UsersRepositoryError};

pub struct PostgresUsersRepository {
    client: Arc<Client>,
}

impl PostgresUsersRepository {
    pub async fn init(client: Arc<Client>) -> anyhow::Result<Self> {
        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS users (
            id              SERIAL PRIMARY KEY,
            email           TEXT NOT NULL UNIQUE,
            params          JSONB
            )
        ",
            )
            .await
            .context("Failed to setup users table")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl UsersRepository for PostgresUsersRepository {
    async fn add_user(&self, user: UserRecord) -> Result<UserId, UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("INSERT INTO users (email, params) VALUES ($1, $2) RETURNING id")
            .await?;

        let rows = match self
            .client
            .query(&stmt, &[&user.details.email, &json!(user)])
            .await
        {
            Ok(rows) => rows,
            Err(err) if is_unique_violation(&err) => {
                return Err(UsersRepositoryError::EmailAlreadyInUse(user.details.email))
            }
            Err(err) => return Err(err.into()),
        };

        let user_id: UserId = rows
            .first()
            .ok_or_else(|| UsersRepositoryError::Other("Id not returned".to_string()))?
            .try_get(0)?;

        Ok(user_id)
    }

    async fn get_user(&self, id: UserId) -> Result<UserRecord, UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT params FROM users WHERE id = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&id]).await?;

        let params: serde_json::Value = rows
            .first()
            .ok_or(UsersRepositoryError::UserNotFound(id))?
            .try_get(0)?;

        Ok(serde_json::from_value(params)?)
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<(UserId, UserRecord)>, UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, params FROM users WHERE email = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&email]).await?;

        match rows.first() {
            Some(row) => {
                let id: UserId = row.try_get(0)?;
                let params: serde_json::Value = row.try_get(1)?;
                Ok(Some((id, serde_json::from_value(params)?)))
            }
            None => Ok(None),
        }
    }

    async fn update_user(&self, id: UserId, user: UserRecord) -> Result<(), UsersRepositoryError> {
        // the email column stays authoritative
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE users SET params = ($1)::JSONB || jsonb_build_object('email', email) \
                 WHERE id = ($2) RETURNING id",
            )
            .await?;

        let rows = self.client.query(&stmt, &[&json!(user), &id]).await?;
        if rows.is_empty() {
            Err(UsersRepositoryError::UserNotFound(id))
        } else {
            Ok(())
        }
    }

    async fn list_users(&self) -> Result<Vec<(UserId, UserDetails)>, UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, params FROM users ORDER BY id")
            .await?;
        let rows = self.client.query(&stmt, &[]).await?;

        rows.iter()
            .map(|row| {
                let id: UserId = row.try_get(0)?;
                let params: serde_json::Value = row.try_get(1)?;
                let user: UserRecord = serde_json::from_value(params)?;
                Ok((id, user.details))
            })
            .collect()
    }
}
