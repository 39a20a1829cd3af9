//! Folder handlers.
//!
//! The folder path is the remainder of the URL after `/storage/files/`,
//! e.g. `/storage/files/~/docs` addresses `~/docs`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::web::dto::{DeleteFolderResponse, FolderListingResponse, FolderResponse, RenameQuery};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AuthUser;

/// GET /storage/files/*path - List a folder.
pub async fn list_folder(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(path): Path<String>,
) -> Result<Json<FolderListingResponse>, ApiError> {
    let listing = state.storage().list_folder(user_id, &path).await?;
    Ok(Json(listing.into()))
}

/// POST /storage/files/*path - Create a folder.
pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(path): Path<String>,
) -> Result<(StatusCode, Json<FolderResponse>), ApiError> {
    let folder = state.storage().create_folder(user_id, &path).await?;
    Ok((StatusCode::CREATED, Json(folder.into())))
}

/// PATCH /storage/files/*path?name=... - Rename a folder.
pub async fn rename_folder(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(path): Path<String>,
    Query(query): Query<RenameQuery>,
) -> Result<Json<FolderResponse>, ApiError> {
    let folder = state
        .storage()
        .rename_folder(user_id, &path, &query.name)
        .await?;
    Ok(Json(folder.into()))
}

/// DELETE /storage/files/*path - Delete a folder recursively.
pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(path): Path<String>,
) -> Result<Json<DeleteFolderResponse>, ApiError> {
    let deleted_files = state.storage().delete_folder(user_id, &path).await?;
    Ok(Json(DeleteFolderResponse { deleted_files }))
}
