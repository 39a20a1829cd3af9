//! Shared helpers for HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum_test::TestServer;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use nimbus::db::AuthTokenRepository;
use nimbus::storage::{BlobStore, QuotaLedger};
use nimbus::web::{create_router, AppState};
use nimbus::{Database, NewUser, Role, UserRepository};

/// Body limit used by the test router.
pub const TEST_MAX_CHUNK_BYTES: usize = 1024 * 1024;

/// A test server with one registered user.
pub struct TestApp {
    pub server: TestServer,
    pub db: Arc<Database>,
    pub blobs: BlobStore,
    pub user_id: i64,
    pub token: String,
    _storage_dir: TempDir,
}

impl TestApp {
    /// Create a server backed by an in-memory database and a temp storage
    /// root, with a user holding `quota` bytes.
    pub async fn new(quota: i64) -> Self {
        let storage_dir = TempDir::new().expect("Failed to create storage dir");
        let blobs = BlobStore::new(storage_dir.path()).expect("Failed to create blob store");
        let db = Arc::new(
            Database::open_in_memory()
                .await
                .expect("Failed to create test database"),
        );

        let app_state = Arc::new(AppState::new(db.clone(), blobs.clone()));
        let router = create_router(app_state, &[], TEST_MAX_CHUNK_BYTES);
        let server = TestServer::new(router).expect("Failed to create test server");

        let (user_id, token) = add_user(&db, "alice", quota, Role::User).await;

        Self {
            server,
            db,
            blobs,
            user_id,
            token,
            _storage_dir: storage_dir,
        }
    }

    /// Authorization header value for the default user.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Current `used_bytes` of a user.
    pub async fn used_bytes(&self, user_id: i64) -> i64 {
        let mut conn = self.db.pool().acquire().await.expect("acquire");
        QuotaLedger::usage(&mut conn, user_id)
            .await
            .expect("usage")
            .0
    }

    /// Number of rows in the file registry.
    pub async fn file_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(self.db.pool())
            .await
            .expect("count files")
    }

    /// Start an upload of `content` into `folder` and return the upload id.
    pub async fn start_upload(&self, folder: &str, filename: &str, content: &[u8]) -> String {
        let response = self
            .server
            .post("/storage/upload")
            .add_header(AUTHORIZATION, self.bearer())
            .json(&json!({
                "path": folder,
                "filename": filename,
                "mime": "text/plain",
                "size_bytes": content.len(),
                "sha256": sha256_hex(content),
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json::<Value>()["upload_id"]
            .as_str()
            .expect("upload_id")
            .to_string()
    }

    /// Upload `content` as one chunk and finish; returns the file uuid.
    pub async fn upload(&self, folder: &str, filename: &str, content: &[u8]) -> String {
        let id = self.start_upload(folder, filename, content).await;
        if !content.is_empty() {
            self.server
                .put(&format!("/storage/uploads/{id}?offset=0"))
                .bytes(content.to_vec().into())
                .await
                .assert_status_ok();
        }
        let response = self.server.post(&format!("/storage/uploads/{id}")).await;
        response.assert_status_ok();
        response.json::<Value>()["uuid"]
            .as_str()
            .expect("uuid")
            .to_string()
    }
}

/// Create a user and issue a token for it.
pub async fn add_user(db: &Database, username: &str, quota: i64, role: Role) -> (i64, String) {
    let user = UserRepository::new(db.pool())
        .create(&NewUser::new(username, "hash", quota).with_role(role))
        .await
        .expect("Failed to create user");
    let token = AuthTokenRepository::new(db.pool())
        .issue(user.id)
        .await
        .expect("Failed to issue token");
    (user.id, token.token)
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
