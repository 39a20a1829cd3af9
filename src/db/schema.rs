//! Database schema and migrations for nimbus.
//!
//! Migrations are applied sequentially when the database is first opened
//! or upgraded. Never edit a shipped migration; append a new one.

/// Database migrations.
///
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: users, folders, files, auth tokens
    r#"
CREATE TABLE users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT NOT NULL UNIQUE COLLATE NOCASE,
    credential  TEXT NOT NULL,
    role        TEXT NOT NULL DEFAULT 'user',        -- 'user' or 'admin'
    quota_bytes INTEGER NOT NULL CHECK (quota_bytes >= 0),
    used_bytes  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (used_bytes >= 0 AND used_bytes <= quota_bytes)
);

CREATE TABLE folders (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    parent_id   INTEGER REFERENCES folders(id),
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (owner_id, parent_id, name)
);

-- UNIQUE treats NULL parents as distinct, so the single root needs its own index
CREATE UNIQUE INDEX idx_folders_root ON folders(owner_id) WHERE parent_id IS NULL;
CREATE INDEX idx_folders_parent ON folders(parent_id);

CREATE TABLE files (
    uuid          TEXT PRIMARY KEY,
    owner_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    folder_id     INTEGER NOT NULL REFERENCES folders(id),
    stored_path   TEXT NOT NULL,                     -- relative to the storage root
    display_name  TEXT NOT NULL,
    mime          TEXT NOT NULL DEFAULT '',
    declared_size INTEGER NOT NULL CHECK (declared_size >= 0),
    on_disk_size  INTEGER NOT NULL DEFAULT 0,
    sha256        TEXT NOT NULL,
    state         TEXT NOT NULL DEFAULT 'pending'
                  CHECK (state IN ('pending', 'complete', 'deleted')),
    created_at    TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (on_disk_size >= 0 AND on_disk_size <= declared_size)
);

CREATE INDEX idx_files_folder ON files(folder_id, state);
CREATE INDEX idx_files_state_created ON files(state, created_at);

CREATE TABLE auth_tokens (
    token       TEXT PRIMARY KEY,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at  TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_auth_tokens_user ON auth_tokens(user_id);
CREATE INDEX idx_auth_tokens_expires ON auth_tokens(expires_at);
"#,
    // v2: last-activity timestamp on files, so the reaper spares uploads
    // that are still receiving chunks
    r#"
ALTER TABLE files ADD COLUMN updated_at TEXT;
UPDATE files SET updated_at = created_at;

DROP INDEX idx_files_state_created;
CREATE INDEX idx_files_state_updated ON files(state, updated_at);
"#,
];
