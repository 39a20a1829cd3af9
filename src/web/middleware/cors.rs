//! CORS middleware configuration.

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

/// Methods used by the upload, file and folder routes.
const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// Create a CORS layer for the storage API.
///
/// Browsers reading a download need `Content-Disposition` and
/// `Content-Length` exposed. Without configured (or parseable) origins any
/// origin is allowed, but credentials are not.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods(ALLOWED_METHODS)
        .expose_headers([CONTENT_DISPOSITION, CONTENT_LENGTH]);

    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if allowed.is_empty() {
        return base.allow_origin(Any).allow_headers(Any);
    }

    base.allow_origin(allowed)
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
        .allow_credentials(true)
}
