//! Request DTOs for the HTTP API.

use serde::Deserialize;

/// Start upload request.
#[derive(Debug, Deserialize)]
pub struct StartUploadRequest {
    /// Destination folder path, e.g. `~/docs`.
    pub path: String,
    /// Display name of the new file.
    pub filename: String,
    /// MIME type (optional).
    #[serde(default)]
    pub mime: String,
    /// Exact size in bytes.
    pub size_bytes: i64,
    /// SHA-256 of the content, hex.
    pub sha256: String,
}

/// Query for a chunk write.
#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    /// Byte offset of the chunk.
    pub offset: u64,
}

/// Query carrying a new name.
#[derive(Debug, Deserialize)]
pub struct RenameQuery {
    /// New file or folder name.
    pub name: String,
}

/// Query for an admin quota change.
#[derive(Debug, Deserialize)]
pub struct QuotaQuery {
    /// New quota in bytes.
    pub bytes: i64,
}
