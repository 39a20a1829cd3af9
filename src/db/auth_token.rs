//! Auth token repository.
//!
//! Bearer tokens are 32 random bytes, hex encoded. The primary key on
//! `auth_tokens.token` is the uniqueness gate: a colliding token is simply
//! regenerated and the insert retried.

use rand::RngCore;

use super::DbPool;
use crate::datetime::sqlite_expiry;
use crate::error::is_unique_violation;
use crate::{NimbusError, Result};

/// Lifetime of a freshly issued token.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Attempts before giving up on finding an unused token.
const MAX_ISSUE_ATTEMPTS: usize = 8;

/// Auth token entity.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthToken {
    /// Token string (64 hex chars).
    pub token: String,
    /// Owning user.
    pub user_id: i64,
    /// Expiration timestamp (SQLite format, UTC).
    pub expires_at: String,
}

/// Generate a raw token: 32 random bytes as lowercase hex.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Repository for auth token operations.
pub struct AuthTokenRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> AuthTokenRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Issue a new token for a user, valid for [`TOKEN_TTL_HOURS`].
    pub async fn issue(&self, user_id: i64) -> Result<AuthToken> {
        let expires_at = sqlite_expiry(chrono::Duration::hours(TOKEN_TTL_HOURS));

        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token = generate_token();
            let inserted = sqlx::query(
                "INSERT INTO auth_tokens (token, user_id, expires_at) VALUES (?, ?, ?)",
            )
            .bind(&token)
            .bind(user_id)
            .bind(&expires_at)
            .execute(self.pool)
            .await;

            match inserted {
                Ok(_) => {
                    return Ok(AuthToken {
                        token,
                        user_id,
                        expires_at,
                    })
                }
                Err(e) if is_unique_violation(&e) => {
                    tracing::warn!("auth token collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(NimbusError::Conflict(
            "could not allocate a unique auth token".to_string(),
        ))
    }

    /// Resolve a token to its user ID.
    ///
    /// Unknown and expired tokens both yield `Unauthorized`.
    pub async fn authenticate_user(&self, token: &str) -> Result<i64> {
        let user_id: Option<i64> = sqlx::query_scalar(
            "SELECT user_id FROM auth_tokens WHERE token = ? AND expires_at > datetime('now')",
        )
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        user_id.ok_or_else(|| NimbusError::Unauthorized("invalid or expired token".to_string()))
    }

    /// Check whether a token belongs to an administrator.
    pub async fn authenticate_admin(&self, token: &str) -> Result<bool> {
        let is_admin: Option<bool> = sqlx::query_scalar(
            "SELECT u.role = 'admin' FROM auth_tokens t
             JOIN users u ON u.id = t.user_id
             WHERE t.token = ? AND t.expires_at > datetime('now')",
        )
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        Ok(is_admin.unwrap_or(false))
    }

    /// Revoke a single token.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE token = ?")
            .bind(token)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete expired tokens.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at <= datetime('now')")
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
