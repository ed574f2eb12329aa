use crate::AppState;
use axum::{Router, routing::get};

/// Public Router Module
///
/// Unauthenticated endpoints.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Used by monitoring and load balancer checks.
        .route("/health", get(|| async { "ok" }))
}
