//! API handlers.

pub mod file;
pub mod folder;
pub mod upload;
pub mod user;

pub use file::*;
pub use folder::*;
pub use upload::*;
pub use user::*;

use std::sync::Arc;

use crate::storage::{BlobStore, StorageService, UploadManager};
use crate::Database;

/// Shared database handle.
pub type SharedDatabase = Arc<Database>;

/// Application state shared by every handler.
pub struct AppState {
    /// Database connection pool.
    pub db: SharedDatabase,
    /// Blob storage root.
    pub blobs: BlobStore,
}

impl AppState {
    /// Create a new application state.
    pub fn new(db: SharedDatabase, blobs: BlobStore) -> Self {
        Self { db, blobs }
    }

    /// Upload session manager over this state.
    pub fn uploads(&self) -> UploadManager<'_> {
        UploadManager::new(&self.db, &self.blobs)
    }

    /// Storage service over this state.
    pub fn storage(&self) -> StorageService<'_> {
        StorageService::new(&self.db, &self.blobs)
    }
}
