//! Upload handlers.
//!
//! Chunk, finish and abort are addressed by upload id alone; the id is
//! handed out only to the authenticated user that started the session.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use futures::TryStreamExt;
use std::io;
use std::sync::Arc;
use tokio_util::io::StreamReader;

use crate::storage::UploadRequest;
use crate::web::dto::{
    ChunkQuery, ChunkResponse, FileResponse, StartUploadRequest, StartUploadResponse,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AuthUser;

/// POST /storage/upload - Start a resumable upload.
pub async fn start_upload(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<StartUploadRequest>,
) -> Result<(StatusCode, Json<StartUploadResponse>), ApiError> {
    let request = UploadRequest {
        owner_id: user_id,
        folder_path: req.path,
        filename: req.filename,
        mime: req.mime,
        declared_size: req.size_bytes,
        sha256: req.sha256,
    };

    let upload_id = state.uploads().start(&request).await?;
    Ok((StatusCode::CREATED, Json(StartUploadResponse { upload_id })))
}

/// PUT /storage/uploads/:id?offset=N - Write one chunk.
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ChunkQuery>,
    body: Bytes,
) -> Result<Json<ChunkResponse>, ApiError> {
    let on_disk_size = state
        .uploads()
        .write_chunk(&id, query.offset, &body)
        .await?;
    Ok(Json(ChunkResponse { on_disk_size }))
}

/// POST /storage/uploads/:id - Verify and commit an upload.
pub async fn finish_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, ApiError> {
    let record = state.uploads().finish(&id).await?;
    Ok(Json(record.into()))
}

/// DELETE /storage/uploads/:id - Abandon an upload.
pub async fn abort_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.uploads().abort(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /storage/file - Single-shot multipart upload.
///
/// The text fields `path`, `size_bytes` and `sha256` (and optionally
/// `mime`) must precede the `file` part, whose body is streamed to disk.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileResponse>), ApiError> {
    let mut path: Option<String> = None;
    let mut mime = String::new();
    let mut size_bytes: Option<i64> = None;
    let mut sha256: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!("Failed to read multipart field: {}", e);
        ApiError::bad_request("Invalid multipart data")
    })? {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            let filename = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| ApiError::bad_request("File part has no filename"))?;
            if mime.is_empty() {
                mime = field.content_type().unwrap_or("").to_string();
            }

            let request = UploadRequest {
                owner_id: user_id,
                folder_path: path.ok_or_else(|| ApiError::bad_request("Missing path field"))?,
                filename,
                mime,
                declared_size: size_bytes
                    .ok_or_else(|| ApiError::bad_request("Missing size_bytes field"))?,
                sha256: sha256.ok_or_else(|| ApiError::bad_request("Missing sha256 field"))?,
            };

            let mut reader = StreamReader::new(Box::pin(field.map_err(io::Error::other)));
            let record = state.uploads().ingest(&request, &mut reader).await?;
            return Ok((StatusCode::CREATED, Json(record.into())));
        }

        let value = field.text().await.map_err(|e| {
            tracing::debug!("Failed to read multipart text field: {}", e);
            ApiError::bad_request("Invalid multipart data")
        })?;
        match name.as_str() {
            "path" => path = Some(value),
            "mime" => mime = value,
            "size_bytes" => {
                size_bytes = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ApiError::bad_request("size_bytes must be an integer"))?,
                )
            }
            "sha256" => sha256 = Some(value),
            _ => {}
        }
    }

    Err(ApiError::bad_request("No file provided"))
}
