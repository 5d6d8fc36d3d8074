//! Health check endpoint for monitoring and readiness checks

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use super::routes::ApiState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" when responding
    pub status: String,
    /// RFC 3339 time of the check
    pub timestamp: String,
    pub title: String,
}

/// Unauthenticated liveness endpoint
pub async fn health_handler(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            title: state.config.server.title.clone(),
        }),
    )
}
