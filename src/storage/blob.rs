//! On-disk blob namespace.
//!
//! Committed blobs are sharded by the first two characters of their uuid;
//! uncommitted uploads live under a separate temp directory:
//! ```text
//! {root}/
//! ├── .partial/
//! │   └── 9f1c0b7e-....part
//! ├── 3a/
//! │   └── 3a41d2c8-5678-90ab-cdef-123456789012
//! └── ...
//! ```
//! Paths stored in the registry are relative to the root, so the root can
//! move without rewriting rows.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::RwLock;

use super::{PARTIAL_DIR, PARTIAL_SUFFIX};
use crate::{NimbusError, Result};

/// Number of striped upload locks.
const LOCK_STRIPES: usize = 64;

/// Blob storage rooted at a configured directory.
///
/// Clones share the same upload locks.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    locks: Arc<[RwLock<()>]>,
}

impl BlobStore {
    /// Create a BlobStore, creating the root and temp directories if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(PARTIAL_DIR))?;
        let locks = (0..LOCK_STRIPES).map(|_| RwLock::new(())).collect();

        Ok(Self { root, locks })
    }

    /// Lock guarding an upload's temp file.
    ///
    /// Chunk writes hold it shared; finishing and purging hold it
    /// exclusively, so no write can land in a file that is being verified,
    /// renamed or unlinked. Ids hash onto a fixed set of stripes.
    pub fn upload_lock(&self, id: &str) -> &RwLock<()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.locks[(hasher.finish() % self.locks.len() as u64) as usize]
    }

    /// Get the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative path of the temp file for an upload.
    pub fn partial_path(id: &str) -> String {
        format!("{PARTIAL_DIR}/{id}{PARTIAL_SUFFIX}")
    }

    /// Relative path of a committed blob.
    pub fn final_path(id: &str) -> String {
        format!("{}/{}", Self::shard(id), id)
    }

    /// Absolute path for a registry-relative path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// The first 2 characters of the id.
    fn shard(id: &str) -> &str {
        id.get(..2).unwrap_or(id)
    }

    /// Create an empty temp file and flush it to stable storage.
    pub async fn create_partial(&self, relative: &str) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.resolve(relative))
            .await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Write `bytes` at `offset` and fsync before returning.
    ///
    /// The file must already exist; a missing temp file means the upload was
    /// aborted or committed concurrently.
    pub async fn write_at(&self, relative: &str, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut file = Self::open_existing(&self.resolve(relative)).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Copy at most `limit + 1` bytes from `reader` into an existing temp
    /// file, fsync, and return the number of bytes written.
    ///
    /// Reading one byte past the limit lets the caller detect an oversized
    /// body without buffering it.
    pub async fn write_stream<R: AsyncRead + Unpin>(
        &self,
        relative: &str,
        reader: &mut R,
        limit: u64,
    ) -> Result<u64> {
        let mut file = Self::open_existing(&self.resolve(relative)).await?;
        file.set_len(0).await?;
        let mut limited = reader.take(limit.saturating_add(1));
        let written = tokio::io::copy(&mut limited, &mut file).await?;
        file.sync_all().await?;
        Ok(written)
    }

    /// Move a temp file to its final location.
    ///
    /// The data is flushed before the rename and the shard directory after
    /// it, so a crash leaves either the temp file or the final file, never
    /// neither. Renaming a file that was already moved is a no-op.
    pub async fn commit(&self, partial: &str, final_rel: &str) -> Result<()> {
        let from = self.resolve(partial);
        let to = self.resolve(final_rel);

        let shard_dir = to
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&shard_dir).await?;

        match File::open(&from).await {
            Ok(f) => f.sync_all().await?,
            Err(e) if e.kind() == io::ErrorKind::NotFound && self.exists(final_rel).await => {
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        fs::rename(&from, &to).await?;
        Self::sync_dir(&shard_dir).await?;
        Ok(())
    }

    /// Delete a file.
    ///
    /// Returns `false` if it didn't exist.
    pub async fn remove(&self, relative: &str) -> Result<bool> {
        match fs::remove_file(self.resolve(relative)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Check if a file exists.
    pub async fn exists(&self, relative: &str) -> bool {
        fs::try_exists(self.resolve(relative)).await.unwrap_or(false)
    }

    /// Size of a stored file in bytes.
    pub async fn size(&self, relative: &str) -> Result<u64> {
        match fs::metadata(self.resolve(relative)).await {
            Ok(m) => Ok(m.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(NimbusError::NotFound(format!("blob {relative}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a stored file for reading.
    pub async fn open(&self, relative: &str) -> Result<File> {
        match File::open(self.resolve(relative)).await {
            Ok(f) => Ok(f),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(NimbusError::NotFound(format!("blob {relative}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open_existing(path: &Path) -> Result<File> {
        match OpenOptions::new().write(true).open(path).await {
            Ok(f) => Ok(f),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(NimbusError::NotFound("upload data".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(unix)]
    async fn sync_dir(dir: &Path) -> Result<()> {
        File::open(dir).await?.sync_all().await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn sync_dir(_dir: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BlobStore) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_new_creates_partial_dir() {
        let (dir, store) = setup();
        assert_eq!(store.root(), dir.path());
        assert!(dir.path().join(PARTIAL_DIR).is_dir());
    }

    #[test]
    fn test_paths() {
        let id = "ab12cd34-5678-90ab-cdef-123456789012";
        assert_eq!(BlobStore::partial_path(id), format!(".partial/{id}.part"));
        assert_eq!(BlobStore::final_path(id), format!("ab/{id}"));
        assert_eq!(BlobStore::shard("a"), "a");
    }

    #[tokio::test]
    async fn test_out_of_order_writes() {
        let (_dir, store) = setup();
        let rel = BlobStore::partial_path("ooo");
        store.create_partial(&rel).await.unwrap();

        store.write_at(&rel, 5, b"world").await.unwrap();
        store.write_at(&rel, 0, b"hello").await.unwrap();
        // retransmission of the same range
        store.write_at(&rel, 0, b"hello").await.unwrap();

        let content = std::fs::read(store.resolve(&rel)).unwrap();
        assert_eq!(content, b"helloworld");
        assert_eq!(store.size(&rel).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_create_partial_refuses_existing() {
        let (_dir, store) = setup();
        let rel = BlobStore::partial_path("dup");
        store.create_partial(&rel).await.unwrap();
        assert!(store.create_partial(&rel).await.is_err());
    }

    #[tokio::test]
    async fn test_write_at_missing_file() {
        let (_dir, store) = setup();
        let result = store.write_at(".partial/none.part", 0, b"x").await;
        assert!(matches!(result, Err(NimbusError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_write_stream_reports_overflow() {
        let (_dir, store) = setup();
        let rel = BlobStore::partial_path("stream");
        store.create_partial(&rel).await.unwrap();

        let mut body: &[u8] = b"0123456789abc";
        let written = store.write_stream(&rel, &mut body, 10).await.unwrap();
        assert_eq!(written, 11);

        let mut exact: &[u8] = b"0123456789";
        let written = store.write_stream(&rel, &mut exact, 10).await.unwrap();
        assert_eq!(written, 10);
        assert_eq!(std::fs::read(store.resolve(&rel)).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_commit_moves_into_shard() {
        let (_dir, store) = setup();
        let id = "cd90ab12-3456-7890-abcd-ef1234567890";
        let partial = BlobStore::partial_path(id);
        let final_rel = BlobStore::final_path(id);
        store.create_partial(&partial).await.unwrap();
        store.write_at(&partial, 0, b"data").await.unwrap();

        store.commit(&partial, &final_rel).await.unwrap();

        assert!(!store.exists(&partial).await);
        assert!(store.exists(&final_rel).await);
        assert!(store.root().join("cd").is_dir());

        // second commit after a crash between rename and registry update
        store.commit(&partial, &final_rel).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove() {
        let (_dir, store) = setup();
        let rel = BlobStore::partial_path("gone");
        store.create_partial(&rel).await.unwrap();

        assert!(store.remove(&rel).await.unwrap());
        assert!(!store.remove(&rel).await.unwrap());
        assert!(matches!(store.open(&rel).await, Err(NimbusError::NotFound(_))));
        assert!(matches!(store.size(&rel).await, Err(NimbusError::NotFound(_))));
    }

    #[test]
    fn test_clones_share_upload_locks() {
        let (_dir, store) = setup();
        let clone = store.clone();
        let id = "ab12cd34-0000-0000-0000-000000000000";

        let _guard = store.upload_lock(id).try_write().unwrap();
        assert!(clone.upload_lock(id).try_read().is_err());
        assert!(std::ptr::eq(store.upload_lock(id), clone.upload_lock(id)));
    }
}
