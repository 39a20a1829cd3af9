//! User repository for nimbus.

use sqlx::SqlitePool;

use super::user::{NewUser, User};
use crate::error::is_unique_violation;
use crate::storage::ROOT_MARKER;
use crate::{NimbusError, Result};

/// Repository for user CRUD operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user together with its root folder.
    ///
    /// Both rows are written in one transaction, so a user never exists
    /// without a `~` folder.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        if new_user.quota_bytes < 0 {
            return Err(NimbusError::Validation(
                "quota must not be negative".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, credential, role, quota_bytes)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&new_user.username)
        .bind(&new_user.credential)
        .bind(new_user.role.as_str())
        .bind(new_user.quota_bytes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                NimbusError::Conflict(format!("username {} already taken", new_user.username))
            } else {
                NimbusError::Database(e.to_string())
            }
        })?;

        sqlx::query("INSERT INTO folders (owner_id, name, parent_id) VALUES (?, ?, NULL)")
            .bind(id)
            .bind(ROOT_MARKER)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| NimbusError::NotFound("user".to_string()))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, User>(
            "SELECT id, username, credential, role, quota_bytes, used_bytes, created_at
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| NimbusError::Database(e.to_string()))?;

        Ok(result)
    }

    /// Get a user by username (case-insensitive).
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, User>(
            "SELECT id, username, credential, role, quota_bytes, used_bytes, created_at
             FROM users WHERE username = ? COLLATE NOCASE",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| NimbusError::Database(e.to_string()))?;

        Ok(result)
    }

    /// Change a user's quota.
    ///
    /// Lowering the quota below the bytes already in use is refused, since
    /// the ledger invariant is only enforced at reservation time.
    pub async fn set_quota(&self, id: i64, quota_bytes: i64) -> Result<()> {
        if quota_bytes < 0 {
            return Err(NimbusError::Validation(
                "quota must not be negative".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE users SET quota_bytes = ? WHERE id = ? AND used_bytes <= ?",
        )
        .bind(quota_bytes)
        .bind(id)
        .bind(quota_bytes)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get_by_id(id).await? {
                Some(_) => Err(NimbusError::Validation(
                    "quota below bytes already in use".to_string(),
                )),
                None => Err(NimbusError::NotFound("user".to_string())),
            };
        }
        Ok(())
    }

    /// Delete a user row.
    ///
    /// Folders, files and tokens cascade. Blobs on disk are not touched;
    /// callers empty the user's tree through the storage service first.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| NimbusError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
