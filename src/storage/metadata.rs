//! File registry types and repository.
//!
//! Every state transition is a conditional statement on the current
//! state, so two racing requests can never both apply it.

use std::fmt;
use std::str::FromStr;

use sqlx::{SqliteConnection, SqlitePool};

use crate::Result;

/// Lifecycle of a file row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Upload in progress; bytes live in a temp file.
    Pending,
    /// Verified and committed to permanent storage.
    Complete,
    /// Rejected upload; the reservation has already been released.
    Deleted,
}

impl FileState {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Pending => "pending",
            FileState::Complete => "complete",
            FileState::Deleted => "deleted",
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileState::Pending),
            "complete" => Ok(FileState::Complete),
            "deleted" => Ok(FileState::Deleted),
            _ => Err(format!("unknown file state: {s}")),
        }
    }
}

impl TryFrom<String> for FileState {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// A row in the file registry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRecord {
    /// Global identifier; doubles as the upload id while pending.
    pub uuid: String,
    /// Owning user.
    pub owner_id: i64,
    /// Containing folder.
    pub folder_id: i64,
    /// Path relative to the storage root (temp path until committed).
    pub stored_path: String,
    /// Name shown to the user.
    pub display_name: String,
    /// Client-declared MIME type (may be empty).
    pub mime: String,
    /// Size declared at upload start.
    pub declared_size: i64,
    /// Highest durably written byte extent.
    pub on_disk_size: i64,
    /// Declared SHA-256, lowercase hex.
    pub sha256: String,
    /// Lifecycle state.
    #[sqlx(try_from = "String")]
    pub state: FileState,
    /// Creation timestamp.
    pub created_at: String,
}

impl FileRecord {
    /// Whether every declared byte has been written.
    pub fn is_fully_written(&self) -> bool {
        self.on_disk_size == self.declared_size
    }
}

/// Data for inserting a pending upload.
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Freshly generated identifier.
    pub uuid: String,
    /// Owning user.
    pub owner_id: i64,
    /// Containing folder.
    pub folder_id: i64,
    /// Temp path relative to the storage root.
    pub stored_path: String,
    /// Name shown to the user.
    pub display_name: String,
    /// Declared MIME type.
    pub mime: String,
    /// Declared size in bytes.
    pub declared_size: i64,
    /// Declared SHA-256, lowercase hex.
    pub sha256: String,
}

/// What a registry delete removed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RemovedFile {
    /// Owner whose ledger must be credited.
    pub owner_id: i64,
    /// State the row was in.
    #[sqlx(try_from = "String")]
    pub state: FileState,
    /// Declared size.
    pub declared_size: i64,
    /// Watermark at removal.
    pub on_disk_size: i64,
    /// Path of the bytes to unlink.
    pub stored_path: String,
}

impl RemovedFile {
    /// Bytes still held in the owner's ledger for this row.
    ///
    /// Pending rows hold their full reservation and complete rows their
    /// on-disk size. Deleted rows were already released.
    pub fn reserved_bytes(&self) -> i64 {
        match self.state {
            FileState::Pending => self.declared_size,
            FileState::Complete => self.on_disk_size,
            FileState::Deleted => 0,
        }
    }
}

const FILE_COLUMNS: &str = "uuid, owner_id, folder_id, stored_path, display_name, mime, \
     declared_size, on_disk_size, sha256, state, created_at";

/// Repository for file registry operations.
pub struct FileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a pending row.
    ///
    /// Returns the raw sqlx error so the caller can tell a uuid collision
    /// apart from other failures.
    pub async fn insert(
        conn: &mut SqliteConnection,
        file: &NewFile,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO files (uuid, owner_id, folder_id, stored_path, display_name, mime,
                                declared_size, on_disk_size, sha256, state, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, 'pending', datetime('now'))",
        )
        .bind(&file.uuid)
        .bind(file.owner_id)
        .bind(file.folder_id)
        .bind(&file.stored_path)
        .bind(&file.display_name)
        .bind(&file.mime)
        .bind(file.declared_size)
        .bind(&file.sha256)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Get a file by uuid, in any state.
    pub async fn get(&self, uuid: &str) -> Result<Option<FileRecord>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE uuid = ?");
        let file = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(uuid)
            .fetch_optional(self.pool)
            .await?;

        Ok(file)
    }

    /// Complete files in a folder, ordered by display name.
    pub async fn list_complete(&self, owner_id: i64, folder_id: i64) -> Result<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE owner_id = ? AND folder_id = ? AND state = 'complete'
             ORDER BY display_name, uuid"
        );
        let files = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(owner_id)
            .bind(folder_id)
            .fetch_all(self.pool)
            .await?;

        Ok(files)
    }

    /// Uuids of every row in a folder, whatever its state.
    pub async fn uuids_in_folder(&self, owner_id: i64, folder_id: i64) -> Result<Vec<String>> {
        let uuids = sqlx::query_scalar(
            "SELECT uuid FROM files WHERE owner_id = ? AND folder_id = ?",
        )
        .bind(owner_id)
        .bind(folder_id)
        .fetch_all(self.pool)
        .await?;

        Ok(uuids)
    }

    /// Raise the watermark to `end` if it is higher, and record activity.
    ///
    /// Returns the new watermark, or None if the row is no longer pending.
    pub async fn advance_watermark(&self, uuid: &str, end: i64) -> Result<Option<i64>> {
        let on_disk = sqlx::query_scalar(
            "UPDATE files SET on_disk_size = MAX(on_disk_size, ?), updated_at = datetime('now')
             WHERE uuid = ? AND state = 'pending'
             RETURNING on_disk_size",
        )
        .bind(end)
        .bind(uuid)
        .fetch_optional(self.pool)
        .await?;

        Ok(on_disk)
    }

    /// Pending to Complete, recording the final path.
    ///
    /// Returns false if the row was not pending.
    pub async fn mark_complete(&self, uuid: &str, stored_path: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE files SET state = 'complete', stored_path = ?
             WHERE uuid = ? AND state = 'pending' AND on_disk_size = declared_size",
        )
        .bind(stored_path)
        .bind(uuid)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Pending to Deleted. Returns false if the row was not pending.
    pub async fn mark_deleted(
        conn: &mut SqliteConnection,
        uuid: &str,
        stored_path: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE files SET state = 'deleted', stored_path = ?, updated_at = datetime('now')
             WHERE uuid = ? AND state = 'pending'",
        )
        .bind(stored_path)
        .bind(uuid)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Remove a row, returning what the caller must release and unlink.
    ///
    /// `owner_id` restricts the delete to that owner; `unfinished_only`
    /// refuses to remove complete rows.
    pub async fn remove(
        conn: &mut SqliteConnection,
        uuid: &str,
        owner_id: Option<i64>,
        unfinished_only: bool,
    ) -> Result<Option<RemovedFile>> {
        let removed = sqlx::query_as::<_, RemovedFile>(
            "DELETE FROM files
             WHERE uuid = ?
               AND (? IS NULL OR owner_id = ?)
               AND (? = 0 OR state != 'complete')
             RETURNING owner_id, state, declared_size, on_disk_size, stored_path",
        )
        .bind(uuid)
        .bind(owner_id)
        .bind(owner_id)
        .bind(unfinished_only)
        .fetch_optional(conn)
        .await?;

        Ok(removed)
    }

    /// Rename a file that has not been rejected.
    pub async fn rename(&self, uuid: &str, owner_id: i64, display_name: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE files SET display_name = ?
             WHERE uuid = ? AND owner_id = ? AND state != 'deleted'",
        )
        .bind(display_name)
        .bind(uuid)
        .bind(owner_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Unfinished rows (pending or deleted) with no activity since `cutoff`.
    ///
    /// Activity is the start, the latest chunk or the rejection.
    pub async fn unfinished_before(&self, cutoff: &str) -> Result<Vec<String>> {
        let uuids = sqlx::query_scalar(
            "SELECT uuid FROM files
             WHERE state IN ('pending', 'deleted') AND updated_at < ?
             ORDER BY updated_at",
        )
        .bind(cutoff)
        .fetch_all(self.pool)
        .await?;

        Ok(uuids)
    }
}
