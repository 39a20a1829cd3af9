//! Response DTOs for the HTTP API.

use serde::Serialize;

use crate::datetime::to_rfc3339;
use crate::db::User;
use crate::storage::{FileRecord, Folder, FolderListing};

/// Response to starting an upload.
#[derive(Debug, Serialize)]
pub struct StartUploadResponse {
    /// Session id; the only credential needed for chunks and finish.
    pub upload_id: String,
}

/// Response to a chunk write.
#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    /// Watermark after the write.
    pub on_disk_size: i64,
}

/// File metadata.
#[derive(Debug, Serialize)]
pub struct FileResponse {
    /// File uuid.
    pub uuid: String,
    /// Display name.
    pub display_name: String,
    /// MIME type as declared.
    pub mime: String,
    /// Size in bytes.
    pub size_bytes: i64,
    /// SHA-256, lowercase hex.
    pub sha256: String,
    /// Creation time (RFC 3339).
    pub created_at: String,
}

impl From<FileRecord> for FileResponse {
    fn from(file: FileRecord) -> Self {
        Self {
            created_at: to_rfc3339(&file.created_at),
            uuid: file.uuid,
            display_name: file.display_name,
            mime: file.mime,
            size_bytes: file.on_disk_size,
            sha256: file.sha256,
        }
    }
}

/// Folder entry in a listing.
#[derive(Debug, Serialize)]
pub struct FolderResponse {
    /// Folder name.
    pub name: String,
    /// Creation time (RFC 3339).
    pub created_at: String,
}

impl From<Folder> for FolderResponse {
    fn from(folder: Folder) -> Self {
        Self {
            name: folder.name,
            created_at: to_rfc3339(&folder.created_at),
        }
    }
}

/// Folder listing.
#[derive(Debug, Serialize)]
pub struct FolderListingResponse {
    /// Child folders.
    pub folders: Vec<FolderResponse>,
    /// Complete files.
    pub files: Vec<FileResponse>,
}

impl From<FolderListing> for FolderListingResponse {
    fn from(listing: FolderListing) -> Self {
        Self {
            folders: listing.folders.into_iter().map(Into::into).collect(),
            files: listing.files.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of a recursive folder delete.
#[derive(Debug, Serialize)]
pub struct DeleteFolderResponse {
    /// Number of files removed.
    pub deleted_files: u64,
}

/// User information.
#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    /// Username.
    pub username: String,
    /// Quota in bytes.
    pub quota_bytes: i64,
    /// Bytes reserved or stored.
    pub used_bytes: i64,
}

impl From<User> for UserInfoResponse {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            quota_bytes: user.quota_bytes,
            used_bytes: user.used_bytes,
        }
    }
}
