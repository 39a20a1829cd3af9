//! File handlers.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::storage::FileRecord;
use crate::web::dto::{FileResponse, RenameQuery};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AuthUser;
use crate::NimbusError;

/// Generate a safe Content-Disposition header value for file downloads.
///
/// Control characters are removed, quotes and backslashes replaced in the
/// ASCII fallback, and non-ASCII names carried in an RFC 5987 `filename*`
/// parameter.
fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && sanitized == filename {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let encoded = urlencoding::encode(filename);
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

/// Content type for a download: the declared MIME type if it is a valid
/// header value, else a guess from the display name.
fn content_type_for(file: &FileRecord) -> String {
    if !file.mime.is_empty() && HeaderValue::from_str(&file.mime).is_ok() {
        return file.mime.clone();
    }
    mime_guess::from_path(&file.display_name)
        .first_or_octet_stream()
        .to_string()
}

/// GET /storage/file/:uuid - Stream a file's content.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(uuid): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let file = state.storage().file_for_download(&uuid, user_id).await?;

    let handle = state.blobs.open(&file.stored_path).await?;
    let length = handle
        .metadata()
        .await
        .map_err(NimbusError::from)?
        .len();

    let response = Response::builder()
        .header(header::CONTENT_TYPE, content_type_for(&file))
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&file.display_name),
        )
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(ReaderStream::new(handle)))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })?;

    Ok(response)
}

/// PATCH /storage/file/:uuid?name=... - Rename a file.
pub async fn rename_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(uuid): Path<String>,
    Query(query): Query<RenameQuery>,
) -> Result<Json<FileResponse>, ApiError> {
    let file = state
        .storage()
        .rename_file(&uuid, user_id, &query.name)
        .await?;
    Ok(Json(file.into()))
}

/// DELETE /storage/file/:uuid - Delete a file and release its quota.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.storage().delete_file(&uuid, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
