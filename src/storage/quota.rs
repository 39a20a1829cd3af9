//! Per-user quota ledger.
//!
//! Both operations are a single conditional UPDATE so concurrent requests
//! for the same user are serialized by the database, never by a
//! read-then-write in Rust. They run on a borrowed connection so callers can
//! make a reservation part of a larger transaction.

use sqlx::SqliteConnection;

use crate::{NimbusError, Result};

/// Atomic reserve/release of a user's byte budget.
pub struct QuotaLedger;

impl QuotaLedger {
    /// Reserve `bytes` for `user_id`.
    ///
    /// Fails with `QuotaExceeded` when the reservation would push
    /// `used_bytes` past `quota_bytes`, leaving the ledger unchanged.
    pub async fn reserve(conn: &mut SqliteConnection, user_id: i64, bytes: i64) -> Result<()> {
        if bytes < 0 {
            return Err(NimbusError::Validation(
                "cannot reserve a negative size".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE users SET used_bytes = used_bytes + ?
             WHERE id = ? AND used_bytes + ? <= quota_bytes",
        )
        .bind(bytes)
        .bind(user_id)
        .bind(bytes)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(user_id, bytes, "quota reservation refused");
            return Err(NimbusError::QuotaExceeded(format!(
                "cannot reserve {bytes} bytes for user {user_id}"
            )));
        }
        Ok(())
    }

    /// Release `bytes` previously reserved for `user_id`.
    ///
    /// The counter is floored at zero, so a spurious second release cannot
    /// drive it negative.
    pub async fn release(conn: &mut SqliteConnection, user_id: i64, bytes: i64) -> Result<()> {
        if bytes < 0 {
            return Err(NimbusError::Validation(
                "cannot release a negative size".to_string(),
            ));
        }
        if bytes == 0 {
            return Ok(());
        }

        sqlx::query("UPDATE users SET used_bytes = MAX(used_bytes - ?, 0) WHERE id = ?")
            .bind(bytes)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Current `(used_bytes, quota_bytes)` for a user.
    pub async fn usage(conn: &mut SqliteConnection, user_id: i64) -> Result<(i64, i64)> {
        sqlx::query_as("SELECT used_bytes, quota_bytes FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| NimbusError::NotFound("user".to_string()))
    }
}
