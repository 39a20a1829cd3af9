//! HTTP API for nimbus.
//!
//! Exposes the upload protocol, file and folder operations and the current
//! user's account over axum.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_health_router, create_router};
pub use server::WebServer;
