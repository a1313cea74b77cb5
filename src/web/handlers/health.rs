//! # Health Check Handler

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    environment: String,
    timestamp: String,
}

/// Basic health check endpoint: GET /health
///
/// Returns OK whenever the process is serving; it does not touch the store.
pub async fn basic_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        environment: state.config.environment.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
