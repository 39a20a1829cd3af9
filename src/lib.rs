//! nimbus - personal cloud storage backend
//!
//! Resumable, quota-accounted uploads with content verification, addressed
//! through per-user `~`-rooted folder trees.

pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod logging;
pub mod storage;
pub mod web;

pub use config::Config;
pub use db::{Database, NewUser, Role, User, UserRepository};
pub use error::{NimbusError, Result};
pub use storage::{BlobStore, StorageService, UploadManager, UploadRequest};
pub use web::WebServer;
