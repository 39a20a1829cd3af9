//! Error types for nimbus.

use thiserror::Error;

/// Common error type for nimbus.
#[derive(Error, Debug)]
pub enum NimbusError {
    /// Database error.
    ///
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error while touching the storage root.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing, unknown or expired credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller does not own the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Folder path did not resolve, or is malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Reservation would push used bytes past the quota.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Upload has fewer bytes on disk than declared.
    #[error("upload incomplete: {on_disk} of {declared} bytes received")]
    Incomplete {
        /// Bytes durably written so far.
        on_disk: i64,
        /// Bytes declared at start.
        declared: i64,
    },

    /// Computed digest differs from the declared one.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Client-declared SHA-256.
        expected: String,
        /// SHA-256 of the bytes on disk.
        actual: String,
    },

    /// Upload session no longer accepts chunks or a finish.
    #[error("upload already complete: {0}")]
    AlreadyComplete(String),

    /// Duplicate identifier or sibling name.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for NimbusError {
    fn from(e: sqlx::Error) -> Self {
        NimbusError::Database(e.to_string())
    }
}

/// Returns true when a sqlx error is a UNIQUE / PRIMARY KEY violation.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}

/// Result type alias for nimbus operations.
pub type Result<T> = std::result::Result<T, NimbusError>;
