//! # Web API Module
//!
//! REST surface over the lead pipeline: lead views, sync lookup, retry
//! orchestration and metrics. Handlers stay thin; each one validates input,
//! calls a core component through [`AppState`] and wraps the result in the
//! response envelope from [`response_types`].

use axum::Router;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

pub mod handlers;
pub mod response_types;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the web application with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let common_middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_millis(
            state.config.web.request_timeout_ms,
        )))
        .layer(cors);

    let app = Router::new()
        .merge(routes::health_routes())
        .merge(routes::lead_routes())
        .merge(routes::metrics_routes())
        .fallback(handlers::route_not_found)
        .layer(common_middleware)
        .with_state(state);

    info!("Web application created with all routes and middleware");
    app
}
