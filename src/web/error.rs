//! API error handling for the nimbus HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::NimbusError;

/// API error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Bad request (400).
    BadRequest,
    /// Folder path did not resolve (400).
    InvalidPath,
    /// Unauthorized (401).
    Unauthorized,
    /// Forbidden (403).
    Forbidden,
    /// Not found (404).
    NotFound,
    /// Conflict (409).
    Conflict,
    /// Upload has missing bytes (409).
    Incomplete,
    /// Upload no longer accepts chunks (409).
    AlreadyComplete,
    /// Content hash differs from the declared one (422).
    DigestMismatch,
    /// Validation error (422).
    ValidationError,
    /// Storage quota exhausted (507).
    QuotaExceeded,
    /// Internal server error (500).
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest | ErrorCode::InvalidPath => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict | ErrorCode::Incomplete | ErrorCode::AlreadyComplete => {
                StatusCode::CONFLICT
            }
            ErrorCode::DigestMismatch | ErrorCode::ValidationError => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorCode::QuotaExceeded => StatusCode::INSUFFICIENT_STORAGE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// Error detail.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Create an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Create an internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<NimbusError> for ApiError {
    fn from(err: NimbusError) -> Self {
        let code = match &err {
            NimbusError::Unauthorized(_) => ErrorCode::Unauthorized,
            NimbusError::Forbidden(_) => ErrorCode::Forbidden,
            NimbusError::NotFound(_) => ErrorCode::NotFound,
            NimbusError::InvalidPath(_) => ErrorCode::InvalidPath,
            NimbusError::QuotaExceeded(_) => ErrorCode::QuotaExceeded,
            NimbusError::Incomplete { .. } => ErrorCode::Incomplete,
            NimbusError::AlreadyComplete(_) => ErrorCode::AlreadyComplete,
            NimbusError::Conflict(_) => ErrorCode::Conflict,
            NimbusError::DigestMismatch { .. } => ErrorCode::DigestMismatch,
            NimbusError::Validation(_) => ErrorCode::ValidationError,
            NimbusError::Database(_)
            | NimbusError::DatabaseConnection(_)
            | NimbusError::Io(_)
            | NimbusError::Config(_) => {
                tracing::error!("Internal error: {}", err);
                return ApiError::internal("An internal error occurred");
            }
        };
        ApiError::new(code, err.to_string())
    }
}
