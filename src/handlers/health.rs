//! Health check endpoint.

use axum::{routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Server status
    pub status: &'static str,
    /// Current server time (ISO 8601)
    pub timestamp: String,
}

/// Liveness probe
///
/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Create health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
