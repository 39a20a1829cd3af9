//! Router configuration for the HTTP API.

use axum::{
    extract::DefaultBodyLimit,
    http::{header::X_CONTENT_TYPE_OPTIONS, HeaderValue},
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use super::handlers::{
    abort_upload, create_folder, delete_file, delete_folder, delete_me, download_file,
    finish_upload, list_folder, me, rename_file, rename_folder, set_quota, start_upload,
    upload_chunk, upload_file, AppState,
};
use super::middleware::create_cors_layer;

/// Create the main API router.
///
/// Chunk bodies are capped at `max_chunk_bytes`; single-shot bodies are
/// bounded by their declared size instead.
pub fn create_router(
    app_state: Arc<AppState>,
    cors_origins: &[String],
    max_chunk_bytes: usize,
) -> Router {
    let storage_routes = Router::new()
        .route("/upload", post(start_upload))
        .route(
            "/uploads/:id",
            put(upload_chunk)
                .post(finish_upload)
                .delete(abort_upload)
                .layer(DefaultBodyLimit::max(max_chunk_bytes)),
        )
        .route(
            "/file",
            post(upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/file/:uuid",
            get(download_file).patch(rename_file).delete(delete_file),
        )
        .route(
            "/files/*path",
            get(list_folder)
                .post(create_folder)
                .patch(rename_folder)
                .delete(delete_folder),
        );

    let admin_routes = Router::new().route("/users/:id/quota", patch(set_quota));

    Router::new()
        .nest("/storage", storage_routes)
        .route("/user", get(me).delete(delete_me))
        .nest("/admin", admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(SetResponseHeaderLayer::if_not_present(
                    X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                )),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BlobStore;
    use crate::Database;
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_health_router() {
        let server = TestServer::new(create_health_router()).unwrap();
        let response = server.get("/health").await;
        response.assert_status_ok();
        response.assert_text("OK");
    }

    #[tokio::test]
    async fn test_router_sets_nosniff_and_requires_auth() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let state = Arc::new(AppState::new(
            Arc::new(db),
            BlobStore::new(dir.path()).unwrap(),
        ));
        let server = TestServer::new(create_router(state, &[], 1024)).unwrap();

        let response = server.get("/user").await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.header("x-content-type-options"),
            HeaderValue::from_static("nosniff")
        );
    }
}
