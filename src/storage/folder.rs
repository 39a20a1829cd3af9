//! Folder types and the `~`-rooted path resolver.

use sqlx::SqlitePool;

use super::{validate_folder_name, MAX_FOLDER_DEPTH, ROOT_MARKER};
use crate::error::is_unique_violation;
use crate::{NimbusError, Result};

/// A folder in an owner's tree.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Folder {
    /// Unique folder ID.
    pub id: i64,
    /// Owning user.
    pub owner_id: i64,
    /// Folder name (`~` for the root).
    pub name: String,
    /// Parent folder ID (None only for the root).
    pub parent_id: Option<i64>,
    /// When the folder was created.
    pub created_at: String,
}

impl Folder {
    /// Whether this is the owner's root folder.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Split a virtual path into its segments.
///
/// The first segment must be the root marker. One trailing `/` is
/// tolerated; any other empty segment is rejected, as is a path deeper
/// than [`MAX_FOLDER_DEPTH`].
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    let segments: Vec<&str> = trimmed.split('/').collect();

    if segments.first() != Some(&ROOT_MARKER) {
        return Err(NimbusError::InvalidPath(format!(
            "path must start with {ROOT_MARKER}: {path}"
        )));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(NimbusError::InvalidPath(format!(
            "empty path segment: {path}"
        )));
    }
    if segments.len() - 1 > MAX_FOLDER_DEPTH {
        return Err(NimbusError::InvalidPath(format!(
            "path deeper than {MAX_FOLDER_DEPTH} levels"
        )));
    }
    Ok(segments)
}

/// Repository for folder operations.
pub struct FolderRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FolderRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// The owner's root folder.
    pub async fn root(&self, owner_id: i64) -> Result<Folder> {
        sqlx::query_as::<_, Folder>(
            "SELECT id, owner_id, name, parent_id, created_at
             FROM folders WHERE owner_id = ? AND parent_id IS NULL",
        )
        .bind(owner_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| NimbusError::InvalidPath(format!("no root folder for user {owner_id}")))
    }

    /// The unique child of `parent_id` named `name`, if any.
    pub async fn child(&self, owner_id: i64, parent_id: i64, name: &str) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>(
            "SELECT id, owner_id, name, parent_id, created_at
             FROM folders WHERE owner_id = ? AND parent_id = ? AND name = ?",
        )
        .bind(owner_id)
        .bind(parent_id)
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(folder)
    }

    /// Resolve already-split segments, one point lookup per level.
    async fn walk(&self, owner_id: i64, segments: &[&str]) -> Result<Folder> {
        let mut current = self.root(owner_id).await?;
        for segment in segments.iter().skip(1) {
            current = self
                .child(owner_id, current.id, segment)
                .await?
                .ok_or_else(|| {
                    NimbusError::InvalidPath(format!("no folder named {segment}"))
                })?;
        }
        Ok(current)
    }

    /// Resolve a path to the folder it names.
    ///
    /// Any missing link fails the whole resolution; there is no partial
    /// match.
    pub async fn resolve_folder(&self, owner_id: i64, path: &str) -> Result<Folder> {
        let segments = split_path(path)?;
        self.walk(owner_id, &segments).await
    }

    /// Resolve a path to a folder ID.
    pub async fn resolve(&self, owner_id: i64, path: &str) -> Result<i64> {
        Ok(self.resolve_folder(owner_id, path).await?.id)
    }

    /// Create the folder named by the last segment of `path`.
    ///
    /// The parent must already exist. A sibling with the same name is a
    /// conflict.
    pub async fn create(&self, owner_id: i64, path: &str) -> Result<Folder> {
        let segments = split_path(path)?;
        let (name, parent_segments) = match segments.split_last() {
            Some((name, rest)) if !rest.is_empty() => (*name, rest),
            _ => {
                return Err(NimbusError::Conflict(
                    "the root folder already exists".to_string(),
                ))
            }
        };
        validate_folder_name(name)?;

        let parent = self.walk(owner_id, parent_segments).await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO folders (owner_id, name, parent_id) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(owner_id)
        .bind(name)
        .bind(parent.id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                NimbusError::Conflict(format!("folder {name} already exists"))
            } else {
                NimbusError::Database(e.to_string())
            }
        })?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| NimbusError::NotFound("folder".to_string()))
    }

    /// Get a folder by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>(
            "SELECT id, owner_id, name, parent_id, created_at FROM folders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(folder)
    }

    /// Rename the folder at `path`. The root cannot be renamed.
    pub async fn rename(&self, owner_id: i64, path: &str, new_name: &str) -> Result<Folder> {
        validate_folder_name(new_name)?;
        let folder = self.resolve_folder(owner_id, path).await?;
        if folder.is_root() {
            return Err(NimbusError::Validation(
                "the root folder cannot be renamed".to_string(),
            ));
        }

        sqlx::query("UPDATE folders SET name = ? WHERE id = ? AND owner_id = ?")
            .bind(new_name)
            .bind(folder.id)
            .bind(owner_id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    NimbusError::Conflict(format!("folder {new_name} already exists"))
                } else {
                    NimbusError::Database(e.to_string())
                }
            })?;

        Ok(Folder {
            name: new_name.to_string(),
            ..folder
        })
    }

    /// Direct children of a folder, ordered by name.
    pub async fn children(&self, owner_id: i64, folder_id: i64) -> Result<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>(
            "SELECT id, owner_id, name, parent_id, created_at
             FROM folders WHERE owner_id = ? AND parent_id = ? ORDER BY name",
        )
        .bind(owner_id)
        .bind(folder_id)
        .fetch_all(self.pool)
        .await?;

        Ok(folders)
    }

    /// Delete a single, already-emptied, non-root folder row.
    pub async fn delete_row(&self, owner_id: i64, folder_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM folders WHERE id = ? AND owner_id = ? AND parent_id IS NOT NULL",
        )
        .bind(folder_id)
        .bind(owner_id)
        .execute(self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_foreign_key_violation() => {
                NimbusError::Conflict("folder gained new entries during delete".to_string())
            }
            _ => NimbusError::Database(e.to_string()),
        })?;

        Ok(result.rows_affected() > 0)
    }
}
