//! User handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::UserRepository;
use crate::web::dto::{QuotaQuery, UserInfoResponse};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::{AdminUser, AuthUser};
use crate::NimbusError;

/// GET /user - Current user's quota and usage.
pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserInfoResponse>, ApiError> {
    let user = UserRepository::new(state.db.pool())
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| NimbusError::NotFound("user".to_string()))?;

    Ok(Json(user.into()))
}

/// DELETE /user - Delete the current user with all of their files.
pub async fn delete_me(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, ApiError> {
    state.storage().delete_user(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /admin/users/:id/quota?bytes=N - Change a user's quota.
pub async fn set_quota(
    State(state): State<Arc<AppState>>,
    AdminUser(admin_id): AdminUser,
    Path(user_id): Path<i64>,
    Query(query): Query<QuotaQuery>,
) -> Result<Json<UserInfoResponse>, ApiError> {
    let repo = UserRepository::new(state.db.pool());
    repo.set_quota(user_id, query.bytes).await?;
    tracing::info!(admin_id, user_id, quota_bytes = query.bytes, "quota changed");

    let user = repo
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| NimbusError::NotFound("user".to_string()))?;
    Ok(Json(user.into()))
}
