//! Storage module for nimbus.
//!
//! This module implements the file-ingestion pipeline:
//! - Per-user quota ledger with atomic reserve/release
//! - Streaming SHA-256 verification
//! - `~`-rooted virtual folder paths
//! - Resumable upload sessions with crash-safe temp files
//! - File registry and the on-disk blob namespace

mod blob;
mod digest;
mod folder;
mod metadata;
mod quota;
mod service;
mod upload;

pub use blob::BlobStore;
pub use digest::{digest_file, digest_reader, is_valid_digest, normalize_digest, verify};
pub use folder::{split_path, Folder, FolderRepository};
pub use metadata::{FileRecord, FileRepository, FileState, NewFile, RemovedFile};
pub use quota::QuotaLedger;
pub use service::{FolderListing, StorageService};
pub use upload::{ReapSummary, UploadManager, UploadRequest};

use crate::{NimbusError, Result};

/// Name of every owner's root folder.
pub const ROOT_MARKER: &str = "~";

/// Suffix of temp files holding uncommitted uploads.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Directory under the storage root that holds temp files.
pub const PARTIAL_DIR: &str = ".partial";

/// Maximum number of folder levels below the root.
pub const MAX_FOLDER_DEPTH: usize = 64;

/// Maximum length for file and folder names (in characters).
pub const MAX_NAME_LENGTH: usize = 255;

/// Check a file display name or folder name.
///
/// Names may not be empty, `.` or `..`, nor contain `/` or control
/// characters.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NimbusError::Validation("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(NimbusError::Validation(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    if name == "." || name == ".." {
        return Err(NimbusError::Validation(format!("invalid name: {name}")));
    }
    if name.contains('/') || name.chars().any(|c| c.is_control()) {
        return Err(NimbusError::Validation(
            "name must not contain '/' or control characters".to_string(),
        ));
    }
    Ok(())
}

/// Like [`validate_name`], but also reserves the root marker.
pub fn validate_folder_name(name: &str) -> Result<()> {
    validate_name(name)?;
    if name == ROOT_MARKER {
        return Err(NimbusError::Validation(format!(
            "{ROOT_MARKER} is reserved for the root folder"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_accepts_ordinary_names() {
        assert!(validate_name("report.pdf").is_ok());
        assert!(validate_name("日本語 ファイル.txt").is_ok());
        assert!(validate_name("~notes").is_ok());
    }

    #[test]
    fn test_validate_name_rejects() {
        for bad in ["", ".", "..", "a/b", "line\nbreak", "nul\0"] {
            assert!(
                matches!(validate_name(bad), Err(NimbusError::Validation(_))),
                "accepted {bad:?}"
            );
        }
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_name(&long).is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_folder_name_reserves_root() {
        assert!(validate_folder_name("~").is_err());
        assert!(validate_name("~").is_ok());
        assert!(validate_folder_name("photos").is_ok());
    }
}
