//! Upload sessions.
//!
//! A session is a `pending` file row plus a temp file under `.partial/`.
//! The row is created together with the quota reservation; bytes are
//! written in place and the watermark only ever grows. Finishing verifies
//! the digest and moves the temp file into the sharded namespace.

use tokio::io::AsyncRead;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::blob::BlobStore;
use super::digest::{normalize_digest, verify};
use super::folder::FolderRepository;
use super::metadata::{FileRecord, FileRepository, FileState, NewFile};
use super::quota::QuotaLedger;
use super::service::purge_file;
use super::validate_name;
use crate::datetime;
use crate::db::Database;
use crate::error::is_unique_violation;
use crate::{NimbusError, Result};

/// Attempts at drawing an unused upload id before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

/// Parameters for starting an upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Uploading user.
    pub owner_id: i64,
    /// Destination folder, e.g. `~/docs`.
    pub folder_path: String,
    /// Display name of the new file.
    pub filename: String,
    /// Client-declared MIME type.
    pub mime: String,
    /// Exact size the client will send.
    pub declared_size: i64,
    /// SHA-256 of the full content, hex.
    pub sha256: String,
}

/// Outcome of a reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    /// Pending uploads aborted.
    pub aborted: u64,
    /// Rejected uploads purged.
    pub purged: u64,
}

/// Drives the start/chunk/finish state machine.
pub struct UploadManager<'a> {
    db: &'a Database,
    blobs: &'a BlobStore,
}

impl<'a> UploadManager<'a> {
    /// Create a new upload manager.
    pub fn new(db: &'a Database, blobs: &'a BlobStore) -> Self {
        Self { db, blobs }
    }

    /// Open a session and return its id.
    ///
    /// The quota reservation, the registry row and the empty temp file are
    /// created together: if any of them fails, none of them persists.
    pub async fn start(&self, req: &UploadRequest) -> Result<String> {
        validate_name(&req.filename)?;
        if req.declared_size < 0 {
            return Err(NimbusError::Validation(
                "size_bytes must not be negative".to_string(),
            ));
        }
        let sha256 = normalize_digest(&req.sha256)?;
        let folder_id = FolderRepository::new(self.db.pool())
            .resolve(req.owner_id, &req.folder_path)
            .await?;

        let mut tx = self.db.begin().await?;
        QuotaLedger::reserve(&mut tx, req.owner_id, req.declared_size).await?;

        let mut inserted = None;
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let uuid = Uuid::new_v4().to_string();
            let file = NewFile {
                stored_path: BlobStore::partial_path(&uuid),
                uuid,
                owner_id: req.owner_id,
                folder_id,
                display_name: req.filename.clone(),
                mime: req.mime.clone(),
                declared_size: req.declared_size,
                sha256: sha256.clone(),
            };
            match FileRepository::insert(&mut tx, &file).await {
                Ok(()) => {
                    inserted = Some(file);
                    break;
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!(attempt, "upload id collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let file = inserted.ok_or_else(|| {
            NimbusError::Conflict("could not allocate an upload id".to_string())
        })?;

        self.blobs.create_partial(&file.stored_path).await?;

        if let Err(e) = tx.commit().await {
            if let Err(rm) = self.blobs.remove(&file.stored_path).await {
                warn!(upload_id = %file.uuid, error = %rm, "failed to remove orphaned temp file");
            }
            return Err(e.into());
        }

        info!(
            upload_id = %file.uuid,
            owner_id = req.owner_id,
            declared_size = req.declared_size,
            "upload started"
        );
        Ok(file.uuid)
    }

    /// Write `bytes` at `offset` and return the new watermark.
    ///
    /// Writing the same range twice is harmless: the bytes are identical and
    /// the watermark is a maximum.
    pub async fn write_chunk(&self, id: &str, offset: u64, bytes: &[u8]) -> Result<i64> {
        let _shared = self.blobs.upload_lock(id).read().await;
        let repo = FileRepository::new(self.db.pool());
        let record = repo
            .get(id)
            .await?
            .ok_or_else(|| NimbusError::NotFound("upload".to_string()))?;

        if record.state != FileState::Pending || record.is_fully_written() {
            return Err(NimbusError::AlreadyComplete(id.to_string()));
        }
        if bytes.is_empty() {
            return Err(NimbusError::Validation("chunk is empty".to_string()));
        }

        let end = offset
            .checked_add(bytes.len() as u64)
            .and_then(|end| i64::try_from(end).ok())
            .filter(|end| *end <= record.declared_size)
            .ok_or_else(|| {
                NimbusError::Validation(format!(
                    "chunk at offset {offset} runs past the declared size of {}",
                    record.declared_size
                ))
            })?;

        self.blobs
            .write_at(&record.stored_path, offset, bytes)
            .await?;

        let on_disk = repo
            .advance_watermark(id, end)
            .await?
            .ok_or_else(|| NimbusError::AlreadyComplete(id.to_string()))?;

        debug!(upload_id = %id, offset, len = bytes.len(), on_disk, "chunk written");
        Ok(on_disk)
    }

    /// Verify and commit a fully written upload.
    ///
    /// A digest mismatch turns the row into a `deleted` tombstone and
    /// releases its reservation; the temp file is left in place. Chunks in
    /// flight are waited out before verifying.
    pub async fn finish(&self, id: &str) -> Result<FileRecord> {
        let _exclusive = self.blobs.upload_lock(id).write().await;
        let repo = FileRepository::new(self.db.pool());
        let record = repo
            .get(id)
            .await?
            .ok_or_else(|| NimbusError::NotFound("upload".to_string()))?;

        match record.state {
            FileState::Pending => {}
            FileState::Complete => return Err(NimbusError::AlreadyComplete(id.to_string())),
            FileState::Deleted => {
                return Err(NimbusError::Conflict(format!("upload {id} was rejected")))
            }
        }
        if !record.is_fully_written() {
            return Err(NimbusError::Incomplete {
                on_disk: record.on_disk_size,
                declared: record.declared_size,
            });
        }

        // After a crash between rename and registry update only the final
        // file is left.
        let final_rel = BlobStore::final_path(id);
        let source = if self.blobs.exists(&record.stored_path).await {
            record.stored_path.clone()
        } else if self.blobs.exists(&final_rel).await {
            final_rel.clone()
        } else {
            return Err(NimbusError::NotFound("upload data".to_string()));
        };

        match verify(&self.blobs.resolve(&source), &record.sha256).await {
            Ok(()) => {}
            Err(e @ NimbusError::DigestMismatch { .. }) => {
                self.reject(&record, &source).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        if source != final_rel {
            self.blobs.commit(&source, &final_rel).await?;
        }

        if !repo.mark_complete(id, &final_rel).await? {
            if repo.get(id).await?.is_none() {
                // aborted while we were renaming
                self.blobs.remove(&final_rel).await?;
                return Err(NimbusError::NotFound("upload".to_string()));
            }
            return Err(NimbusError::AlreadyComplete(id.to_string()));
        }

        info!(upload_id = %id, size = record.declared_size, "upload complete");
        repo.get(id)
            .await?
            .ok_or_else(|| NimbusError::NotFound("upload".to_string()))
    }

    async fn reject(&self, record: &FileRecord, stored_path: &str) -> Result<()> {
        let mut tx = self.db.begin().await?;
        if FileRepository::mark_deleted(&mut tx, &record.uuid, stored_path).await? {
            QuotaLedger::release(&mut tx, record.owner_id, record.declared_size).await?;
        }
        tx.commit().await?;

        warn!(upload_id = %record.uuid, "upload rejected: digest mismatch");
        Ok(())
    }

    /// Abandon a pending or rejected upload.
    ///
    /// The row is removed and any outstanding reservation released in one
    /// transaction, then the temp file is unlinked.
    pub async fn abort(&self, id: &str) -> Result<()> {
        match purge_file(self.db, self.blobs, id, None, true).await? {
            Some(removed) => {
                info!(upload_id = %id, state = %removed.state, "upload aborted");
                Ok(())
            }
            None => match FileRepository::new(self.db.pool()).get(id).await? {
                Some(_) => Err(NimbusError::AlreadyComplete(id.to_string())),
                None => Err(NimbusError::NotFound("upload".to_string())),
            },
        }
    }

    /// Single-shot upload: start, stream `reader` into the temp file, finish.
    ///
    /// Any failure after the session opened aborts it, so the reservation is
    /// released and no row or temp file is left behind. The session id never
    /// reaches the client, so dropping this future mid-way aborts it too.
    pub async fn ingest<R: AsyncRead + Unpin>(
        &self,
        req: &UploadRequest,
        reader: &mut R,
    ) -> Result<FileRecord> {
        // The session is opened on its own task and handed back armed, so
        // there is no point at which it exists without a guard.
        let (db, blobs, owned) = (self.db.clone(), self.blobs.clone(), req.clone());
        let mut guard = tokio::spawn(async move {
            let id = UploadManager::new(&db, &blobs).start(&owned).await?;
            Ok::<_, NimbusError>(AbortOnDrop {
                db,
                blobs,
                id,
                armed: true,
            })
        })
        .await
        .map_err(|e| NimbusError::Io(std::io::Error::other(e)))??;
        let id = guard.id.clone();

        let result = self.ingest_body(&id, req.declared_size, reader).await;
        if result.is_err() {
            if let Err(abort_err) = self.abort(&id).await {
                warn!(upload_id = %id, error = %abort_err, "failed to abort single-shot upload");
            }
        }
        guard.armed = false;
        result
    }

    async fn ingest_body<R: AsyncRead + Unpin>(
        &self,
        id: &str,
        declared_size: i64,
        reader: &mut R,
    ) -> Result<FileRecord> {
        let limit = declared_size.max(0) as u64;
        let written = self
            .blobs
            .write_stream(&BlobStore::partial_path(id), reader, limit)
            .await?;

        if written > limit {
            return Err(NimbusError::Validation(format!(
                "body exceeds the declared size of {declared_size} bytes"
            )));
        }
        if written < limit {
            return Err(NimbusError::Validation(format!(
                "body is {written} bytes, declared {declared_size}"
            )));
        }

        FileRepository::new(self.db.pool())
            .advance_watermark(id, declared_size)
            .await?
            .ok_or_else(|| NimbusError::AlreadyComplete(id.to_string()))?;

        self.finish(id).await
    }

    /// Abort pending uploads and purge rejected ones that have seen no
    /// activity for `older_than`.
    pub async fn reap_stale(&self, older_than: chrono::Duration) -> Result<ReapSummary> {
        let cutoff = datetime::sqlite_cutoff(older_than);
        let stale = FileRepository::new(self.db.pool())
            .unfinished_before(&cutoff)
            .await?;

        let mut summary = ReapSummary::default();
        for uuid in stale {
            match purge_file(self.db, self.blobs, &uuid, None, true).await {
                Ok(Some(removed)) if removed.state == FileState::Pending => summary.aborted += 1,
                Ok(Some(_)) => summary.purged += 1,
                Ok(None) => {}
                Err(e) => warn!(upload_id = %uuid, error = %e, "failed to reap upload"),
            }
        }

        if summary != ReapSummary::default() {
            info!(
                aborted = summary.aborted,
                purged = summary.purged,
                "reaped stale uploads"
            );
        }
        Ok(summary)
    }
}

/// Aborts a single-shot session whose `ingest` future was dropped before
/// it settled.
struct AbortOnDrop {
    db: Database,
    blobs: BlobStore,
    id: String,
    armed: bool,
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = std::mem::take(&mut self.id);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(upload_id = %id, "runtime gone, leaving dropped upload to the reaper");
            return;
        };

        let db = self.db.clone();
        let blobs = self.blobs.clone();
        handle.spawn(async move {
            if let Err(e) = UploadManager::new(&db, &blobs).abort(&id).await {
                warn!(upload_id = %id, error = %e, "failed to abort dropped upload");
            }
        });
    }
}
