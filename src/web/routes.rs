//! Web API Routes
//!
//! Route definitions grouped by functionality. Every API route answers a
//! bare OPTIONS with 200 and any other unsupported method with the 405
//! envelope.

use axum::routing::{get, post, MethodRouter};
use axum::Router;

use crate::web::handlers;
use crate::web::state::AppState;

/// Attach the OPTIONS and 405 handling shared by every API route
fn api_route(method_router: MethodRouter<AppState>) -> MethodRouter<AppState> {
    method_router
        .options(handlers::options_ok)
        .fallback(handlers::method_not_allowed)
}

/// Liveness check
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::basic_health))
}

/// Lead list, detail, sync lookup and retry
pub fn lead_routes() -> Router<AppState> {
    Router::new()
        .route("/api/leads", api_route(get(handlers::leads::list_leads)))
        .route(
            "/api/leads/sync-status",
            api_route(post(handlers::leads::sync_status)),
        )
        .route(
            "/api/leads/retry",
            api_route(post(handlers::retry::retry_leads)),
        )
        .route(
            "/api/leads/:source/:id",
            api_route(get(handlers::leads::get_lead)),
        )
}

/// Dashboard rollups
pub fn metrics_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/metrics/dashboard",
            api_route(get(handlers::metrics::dashboard)),
        )
        .route(
            "/api/metrics/trends",
            api_route(get(handlers::metrics::trends)),
        )
        .route(
            "/api/metrics/costs",
            api_route(get(handlers::metrics::costs)),
        )
        .route(
            "/api/metrics/activity",
            api_route(get(handlers::metrics::activity)),
        )
}
