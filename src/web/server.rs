//! Web server for nimbus.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::config::Config;
use crate::db::AuthTokenRepository;
use crate::storage::{BlobStore, UploadManager};
use crate::{NimbusError, Result};

use super::handlers::{AppState, SharedDatabase};
use super::router::{create_health_router, create_router};

/// Interval between maintenance passes.
const MAINTENANCE_INTERVAL_SECS: u64 = 3600;

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Allowed CORS origins.
    cors_origins: Vec<String>,
    /// Body limit for chunk uploads.
    max_chunk_bytes: usize,
    /// Reaper cutoff in hours (0 = disabled).
    stale_upload_hours: u64,
}

impl WebServer {
    /// Create a new web server.
    ///
    /// Opens the blob store under the configured root, creating it if
    /// needed.
    pub fn new(config: &Config, db: SharedDatabase) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse::<SocketAddr>()
            .map_err(|e| NimbusError::Config(format!("invalid server address: {e}")))?;

        let blobs = BlobStore::new(&config.storage.root)?;
        tracing::info!("Blob storage initialized at: {}", config.storage.root);

        Ok(Self {
            addr,
            app_state: Arc::new(AppState::new(db, blobs)),
            cors_origins: config.web.cors_origins.clone(),
            max_chunk_bytes: config.storage.max_chunk_bytes(),
            stale_upload_hours: config.storage.stale_upload_hours,
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the maintenance background task.
    ///
    /// Every hour this removes expired auth tokens and, when a stale age is
    /// configured, reaps abandoned uploads.
    fn start_maintenance_task(state: Arc<AppState>, stale_upload_hours: u64) {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));

            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;

                match AuthTokenRepository::new(state.db.pool())
                    .cleanup_expired()
                    .await
                {
                    Ok(count) if count > 0 => {
                        tracing::info!(deleted_count = count, "Cleaned up expired auth tokens");
                    }
                    Ok(_) => tracing::debug!("No expired auth tokens to clean up"),
                    Err(e) => tracing::warn!(error = %e, "Failed to cleanup auth tokens"),
                }

                if stale_upload_hours == 0 {
                    continue;
                }
                let older_than = chrono::Duration::hours(stale_upload_hours as i64);
                if let Err(e) = UploadManager::new(&state.db, &state.blobs)
                    .reap_stale(older_than)
                    .await
                {
                    tracing::warn!(error = %e, "Failed to reap stale uploads");
                }
            }
        });
    }

    fn build_router(&self) -> axum::Router {
        create_router(
            self.app_state.clone(),
            &self.cors_origins,
            self.max_chunk_bytes,
        )
        .merge(create_health_router())
        .layer(CompressionLayer::new())
    }

    async fn bind(self) -> std::io::Result<(TcpListener, axum::Router)> {
        let router = self.build_router();
        let listener = TcpListener::bind(self.addr).await?;

        // Start maintenance after a successful bind
        Self::start_maintenance_task(self.app_state.clone(), self.stale_upload_hours);
        if self.stale_upload_hours > 0 {
            tracing::info!(
                stale_upload_hours = self.stale_upload_hours,
                "Upload reaper enabled"
            );
        }

        tracing::info!("Web server listening on http://{}", listener.local_addr()?);
        Ok((listener, router))
    }

    /// Run the web server.
    pub async fn run(self) -> std::io::Result<()> {
        let (listener, router) = self.bind().await?;
        axum::serve(listener, router).await
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::io::Result<SocketAddr> {
        let (listener, router) = self.bind().await?;
        let local_addr = listener.local_addr()?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn create_test_config(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.storage.root = root.to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_web_server_new() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(dir.path());
        let db = Database::open_in_memory().await.unwrap();

        let server = WebServer::new(&config, Arc::new(db)).unwrap();
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
        assert!(dir.path().join(crate::storage::PARTIAL_DIR).is_dir());
    }

    #[tokio::test]
    async fn test_web_server_rejects_bad_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config(dir.path());
        config.server.host = "not an address".to_string();
        let db = Database::open_in_memory().await.unwrap();

        assert!(matches!(
            WebServer::new(&config, Arc::new(db)),
            Err(NimbusError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_web_server_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(dir.path());
        let db = Database::open_in_memory().await.unwrap();

        let server = WebServer::new(&config, Arc::new(db)).unwrap();
        let addr = server.run_with_addr().await.unwrap();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));
    }
}
