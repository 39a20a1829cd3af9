//! Middleware for the HTTP API.

pub mod auth;
pub mod cors;

pub use auth::{extract_token, AdminUser, AuthUser};
pub use cors::create_cors_layer;
