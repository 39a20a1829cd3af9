//! Storage service: file and folder operations used by the web layer.

use tracing::{info, warn};

use super::blob::BlobStore;
use super::folder::{split_path, Folder, FolderRepository};
use super::metadata::{FileRecord, FileRepository, FileState, RemovedFile};
use super::quota::QuotaLedger;
use super::{validate_name, MAX_FOLDER_DEPTH};
use crate::db::{Database, UserRepository};
use crate::{NimbusError, Result};

/// Contents of one folder.
#[derive(Debug, Clone)]
pub struct FolderListing {
    /// The listed folder.
    pub folder: Folder,
    /// Direct child folders, by name.
    pub folders: Vec<Folder>,
    /// Complete files, by display name.
    pub files: Vec<FileRecord>,
}

/// Remove a file row, release what it still holds and unlink its bytes.
///
/// The row delete and the quota release share one transaction; the unlink
/// happens after commit and tolerates missing files. Returns `None` when no
/// row matched.
pub(crate) async fn purge_file(
    db: &Database,
    blobs: &BlobStore,
    uuid: &str,
    owner_id: Option<i64>,
    unfinished_only: bool,
) -> Result<Option<RemovedFile>> {
    let _exclusive = blobs.upload_lock(uuid).write().await;
    let mut tx = db.begin().await?;
    let Some(removed) = FileRepository::remove(&mut tx, uuid, owner_id, unfinished_only).await?
    else {
        tx.rollback().await?;
        return Ok(None);
    };
    QuotaLedger::release(&mut tx, removed.owner_id, removed.reserved_bytes()).await?;
    tx.commit().await?;

    unlink(blobs, uuid, &removed.stored_path).await;
    if removed.state != FileState::Complete {
        // a crash may have left an already-renamed copy
        unlink(blobs, uuid, &BlobStore::final_path(uuid)).await;
    }
    Ok(Some(removed))
}

async fn unlink(blobs: &BlobStore, uuid: &str, relative: &str) {
    if let Err(e) = blobs.remove(relative).await {
        warn!(uuid, path = relative, error = %e, "failed to unlink blob");
    }
}

/// Storage operations scoped to an owner.
pub struct StorageService<'a> {
    db: &'a Database,
    blobs: &'a BlobStore,
}

impl<'a> StorageService<'a> {
    /// Create a new storage service.
    pub fn new(db: &'a Database, blobs: &'a BlobStore) -> Self {
        Self { db, blobs }
    }

    fn folders(&self) -> FolderRepository<'a> {
        FolderRepository::new(self.db.pool())
    }

    fn files(&self) -> FileRepository<'a> {
        FileRepository::new(self.db.pool())
    }

    /// Look up a file and check who owns it.
    async fn owned_file(&self, uuid: &str, owner_id: i64) -> Result<FileRecord> {
        let file = self
            .files()
            .get(uuid)
            .await?
            .ok_or_else(|| NimbusError::NotFound("file".to_string()))?;

        if file.owner_id != owner_id {
            return Err(NimbusError::Forbidden(
                "file belongs to another user".to_string(),
            ));
        }
        Ok(file)
    }

    /// Delete a file in any state and release its quota.
    pub async fn delete_file(&self, uuid: &str, owner_id: i64) -> Result<()> {
        self.owned_file(uuid, owner_id).await?;

        let removed = purge_file(self.db, self.blobs, uuid, Some(owner_id), false)
            .await?
            .ok_or_else(|| NimbusError::NotFound("file".to_string()))?;

        info!(
            uuid,
            owner_id,
            state = %removed.state,
            released = removed.reserved_bytes(),
            "file deleted"
        );
        Ok(())
    }

    /// Change a file's display name.
    pub async fn rename_file(&self, uuid: &str, owner_id: i64, name: &str) -> Result<FileRecord> {
        validate_name(name)?;
        self.owned_file(uuid, owner_id).await?;

        if !self.files().rename(uuid, owner_id, name).await? {
            return Err(NimbusError::NotFound("file".to_string()));
        }
        self.owned_file(uuid, owner_id).await
    }

    /// A complete file the caller may download.
    pub async fn file_for_download(&self, uuid: &str, owner_id: i64) -> Result<FileRecord> {
        let file = self.owned_file(uuid, owner_id).await?;
        if file.state != FileState::Complete {
            return Err(NimbusError::NotFound("file".to_string()));
        }
        Ok(file)
    }

    /// Create the folder named by `path`.
    pub async fn create_folder(&self, owner_id: i64, path: &str) -> Result<Folder> {
        let folder = self.folders().create(owner_id, path).await?;
        info!(owner_id, folder_id = folder.id, path, "folder created");
        Ok(folder)
    }

    /// Rename the folder at `path`.
    pub async fn rename_folder(&self, owner_id: i64, path: &str, name: &str) -> Result<Folder> {
        self.folders().rename(owner_id, path, name).await
    }

    /// Child folders and complete files of the folder at `path`.
    pub async fn list_folder(&self, owner_id: i64, path: &str) -> Result<FolderListing> {
        let folder = self.folders().resolve_folder(owner_id, path).await?;
        let folders = self.folders().children(owner_id, folder.id).await?;
        let files = self.files().list_complete(owner_id, folder.id).await?;

        Ok(FolderListing {
            folder,
            folders,
            files,
        })
    }

    /// Delete the folder at `path` with everything below it.
    ///
    /// Every file (pending uploads included) is purged with its quota, then
    /// folder rows are removed deepest first. Deleting `~` empties the tree
    /// but keeps the root row. Returns the number of files removed.
    pub async fn delete_folder(&self, owner_id: i64, path: &str) -> Result<u64> {
        let target = self.folders().resolve_folder(owner_id, path).await?;
        let base_depth = split_path(path)?.len();

        // Pre-order walk with an explicit stack; reversed, every folder
        // comes after all of its descendants.
        let mut order = Vec::new();
        let mut stack = vec![(target.id, base_depth)];
        while let Some((folder_id, depth)) = stack.pop() {
            order.push(folder_id);
            let children = self.folders().children(owner_id, folder_id).await?;
            if !children.is_empty() && depth > MAX_FOLDER_DEPTH {
                return Err(NimbusError::InvalidPath(format!(
                    "folder tree deeper than {MAX_FOLDER_DEPTH} levels"
                )));
            }
            stack.extend(children.into_iter().map(|c| (c.id, depth + 1)));
        }

        let mut removed_files = 0u64;
        for folder_id in order.into_iter().rev() {
            for uuid in self.files().uuids_in_folder(owner_id, folder_id).await? {
                if purge_file(self.db, self.blobs, &uuid, Some(owner_id), false)
                    .await?
                    .is_some()
                {
                    removed_files += 1;
                }
            }
            if folder_id != target.id || !target.is_root() {
                self.folders().delete_row(owner_id, folder_id).await?;
            }
        }

        info!(owner_id, path, removed_files, "folder deleted");
        Ok(removed_files)
    }

    /// Delete every file and folder of a user, then the user row.
    pub async fn delete_user(&self, owner_id: i64) -> Result<()> {
        self.delete_folder(owner_id, super::ROOT_MARKER).await?;

        if !UserRepository::new(self.db.pool()).delete(owner_id).await? {
            return Err(NimbusError::NotFound("user".to_string()));
        }
        info!(owner_id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;
    use crate::storage::{digest_reader, UploadManager, UploadRequest};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        db: Database,
        blobs: BlobStore,
        user_id: i64,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let blobs = BlobStore::new(dir.path()).unwrap();
            let db = Database::open_in_memory().await.unwrap();
            let user = UserRepository::new(db.pool())
                .create(&NewUser::new("owner", "hash", 1000))
                .await
                .unwrap();
            Self {
                _dir: dir,
                db,
                blobs,
                user_id: user.id,
            }
        }

        fn service(&self) -> StorageService<'_> {
            StorageService::new(&self.db, &self.blobs)
        }

        async fn upload(&self, folder: &str, name: &str, content: &[u8]) -> FileRecord {
            let mut slice = content;
            let req = UploadRequest {
                owner_id: self.user_id,
                folder_path: folder.to_string(),
                filename: name.to_string(),
                mime: String::new(),
                declared_size: content.len() as i64,
                sha256: digest_reader(&mut slice).await.unwrap(),
            };
            let mut body = content;
            UploadManager::new(&self.db, &self.blobs)
                .ingest(&req, &mut body)
                .await
                .unwrap()
        }

        async fn start_pending(&self, folder: &str, size: i64) -> String {
            let req = UploadRequest {
                owner_id: self.user_id,
                folder_path: folder.to_string(),
                filename: "partial.bin".to_string(),
                mime: String::new(),
                declared_size: size,
                sha256: "a".repeat(64),
            };
            UploadManager::new(&self.db, &self.blobs)
                .start(&req)
                .await
                .unwrap()
        }

        async fn used(&self) -> i64 {
            let mut conn = self.db.pool().acquire().await.unwrap();
            QuotaLedger::usage(&mut conn, self.user_id).await.unwrap().0
        }

        async fn other_user(&self) -> i64 {
            UserRepository::new(self.db.pool())
                .create(&NewUser::new("intruder", "hash", 1000))
                .await
                .unwrap()
                .id
        }
    }

    #[tokio::test]
    async fn test_delete_file_restores_quota() {
        let fx = Fixture::new().await;
        let file = fx.upload("~", "a.txt", b"0123456789").await;
        assert_eq!(fx.used().await, 10);

        fx.service().delete_file(&file.uuid, fx.user_id).await.unwrap();
        assert_eq!(fx.used().await, 0);
        assert!(!fx.blobs.exists(&file.stored_path).await);

        assert!(matches!(
            fx.service().delete_file(&file.uuid, fx.user_id).await,
            Err(NimbusError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_pending_file_releases_reservation() {
        let fx = Fixture::new().await;
        let id = fx.start_pending("~", 40).await;
        assert_eq!(fx.used().await, 40);

        fx.service().delete_file(&id, fx.user_id).await.unwrap();
        assert_eq!(fx.used().await, 0);
        assert!(!fx.blobs.exists(&BlobStore::partial_path(&id)).await);
    }

    #[tokio::test]
    async fn test_delete_file_of_other_owner() {
        let fx = Fixture::new().await;
        let file = fx.upload("~", "a.txt", b"abc").await;
        let other = fx.other_user().await;

        assert!(matches!(
            fx.service().delete_file(&file.uuid, other).await,
            Err(NimbusError::Forbidden(_))
        ));
        assert!(matches!(
            fx.service().file_for_download(&file.uuid, other).await,
            Err(NimbusError::Forbidden(_))
        ));
        assert!(fx.blobs.exists(&file.stored_path).await);
        assert_eq!(fx.used().await, 3);
    }

    #[tokio::test]
    async fn test_delete_file_tolerates_missing_blob() {
        let fx = Fixture::new().await;
        let file = fx.upload("~", "a.txt", b"abc").await;
        std::fs::remove_file(fx.blobs.resolve(&file.stored_path)).unwrap();

        fx.service().delete_file(&file.uuid, fx.user_id).await.unwrap();
        assert_eq!(fx.used().await, 0);
    }

    #[tokio::test]
    async fn test_file_for_download_requires_complete() {
        let fx = Fixture::new().await;
        let id = fx.start_pending("~", 5).await;
        assert!(matches!(
            fx.service().file_for_download(&id, fx.user_id).await,
            Err(NimbusError::NotFound(_))
        ));

        let file = fx.upload("~", "a.txt", b"abc").await;
        let found = fx.service().file_for_download(&file.uuid, fx.user_id).await.unwrap();
        assert_eq!(found.stored_path, file.stored_path);
    }

    #[tokio::test]
    async fn test_rename_file() {
        let fx = Fixture::new().await;
        let file = fx.upload("~", "a.txt", b"abc").await;

        let renamed = fx
            .service()
            .rename_file(&file.uuid, fx.user_id, "b.txt")
            .await
            .unwrap();
        assert_eq!(renamed.display_name, "b.txt");
        assert!(matches!(
            fx.service().rename_file(&file.uuid, fx.user_id, "../x").await,
            Err(NimbusError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_folder() {
        let fx = Fixture::new().await;
        let svc = fx.service();
        svc.create_folder(fx.user_id, "~/b").await.unwrap();
        svc.create_folder(fx.user_id, "~/a").await.unwrap();
        fx.upload("~", "z.txt", b"z").await;
        fx.upload("~", "y.txt", b"y").await;
        fx.start_pending("~", 3).await;

        let listing = svc.list_folder(fx.user_id, "~").await.unwrap();
        assert!(listing.folder.is_root());
        let folders: Vec<_> = listing.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(folders, vec!["a", "b"]);
        let files: Vec<_> = listing.files.iter().map(|f| f.display_name.as_str()).collect();
        assert_eq!(files, vec!["y.txt", "z.txt"]);
    }

    #[tokio::test]
    async fn test_delete_folder_tree_releases_everything() {
        let fx = Fixture::new().await;
        let svc = fx.service();
        svc.create_folder(fx.user_id, "~/docs").await.unwrap();
        svc.create_folder(fx.user_id, "~/docs/2024").await.unwrap();
        svc.create_folder(fx.user_id, "~/docs/2024/q1").await.unwrap();
        svc.create_folder(fx.user_id, "~/keep").await.unwrap();

        let a = fx.upload("~/docs", "a.txt", b"aaaa").await;
        let b = fx.upload("~/docs/2024/q1", "b.txt", b"bb").await;
        let pending = fx.start_pending("~/docs/2024", 7).await;
        let kept = fx.upload("~/keep", "k.txt", b"k").await;
        assert_eq!(fx.used().await, 14);

        let removed = svc.delete_folder(fx.user_id, "~/docs").await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(fx.used().await, 1);

        assert!(!fx.blobs.exists(&a.stored_path).await);
        assert!(!fx.blobs.exists(&b.stored_path).await);
        assert!(!fx.blobs.exists(&BlobStore::partial_path(&pending)).await);
        assert!(fx.blobs.exists(&kept.stored_path).await);

        assert!(matches!(
            svc.list_folder(fx.user_id, "~/docs").await,
            Err(NimbusError::InvalidPath(_))
        ));
        assert!(svc.list_folder(fx.user_id, "~/keep").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_root_keeps_root_row() {
        let fx = Fixture::new().await;
        let svc = fx.service();
        svc.create_folder(fx.user_id, "~/docs").await.unwrap();
        fx.upload("~", "a.txt", b"abc").await;
        fx.upload("~/docs", "b.txt", b"de").await;

        assert_eq!(svc.delete_folder(fx.user_id, "~").await.unwrap(), 2);
        assert_eq!(fx.used().await, 0);

        let listing = svc.list_folder(fx.user_id, "~").await.unwrap();
        assert!(listing.folders.is_empty());
        assert!(listing.files.is_empty());
    }

    #[tokio::test]
    async fn test_delete_user_removes_everything() {
        let fx = Fixture::new().await;
        let svc = fx.service();
        svc.create_folder(fx.user_id, "~/docs").await.unwrap();
        let file = fx.upload("~/docs", "a.txt", b"abc").await;

        svc.delete_user(fx.user_id).await.unwrap();
        assert!(!fx.blobs.exists(&file.stored_path).await);
        assert!(UserRepository::new(fx.db.pool())
            .get_by_id(fx.user_id)
            .await
            .unwrap()
            .is_none());

        let folders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM folders")
            .fetch_one(fx.db.pool())
            .await
            .unwrap();
        assert_eq!(folders, 0);
    }
}
