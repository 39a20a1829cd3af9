//! Token authentication extractors.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;

use crate::db::AuthTokenRepository;
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Query parameter carrying the token for links opened by a browser.
const TOKEN_QUERY_PARAM: &str = "auth";

/// Pull the bearer token out of a request.
///
/// The `Authorization` header wins; it may carry the token bare or with a
/// `Bearer ` prefix. Otherwise the `auth` query parameter is used.
pub fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    parts.uri.query().unwrap_or("").split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == TOKEN_QUERY_PARAM && !value.is_empty() {
            urlencoding::decode(value).ok().map(|s| s.into_owned())
        } else {
            None
        }
    })
}

/// Extractor for authenticated users.
///
/// Holds the id of the user the token belongs to.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let token =
                extract_token(parts).ok_or_else(|| ApiError::unauthorized("Missing authorization"))?;

            let user_id = AuthTokenRepository::new(state.db.pool())
                .authenticate_user(&token)
                .await
                .map_err(ApiError::from)?;

            Ok(AuthUser(user_id))
        })
    }
}

/// Extractor for administrators.
///
/// A valid token that does not belong to an admin is rejected with 403.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub i64);

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let token =
                extract_token(parts).ok_or_else(|| ApiError::unauthorized("Missing authorization"))?;

            let repo = AuthTokenRepository::new(state.db.pool());
            let user_id = repo.authenticate_user(&token).await.map_err(ApiError::from)?;
            if !repo.authenticate_admin(&token).await.map_err(ApiError::from)? {
                return Err(ApiError::forbidden("Admin access required"));
            }

            Ok(AdminUser(user_id))
        })
    }
}
