//! # Web API Handlers
//!
//! HTTP request handlers for the lead, retry and metrics endpoints.

pub mod health;
pub mod leads;
pub mod metrics;
pub mod retry;

use axum::http::StatusCode;

use crate::web::response_types::ApiError;

/// Method fallback for every API route
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// OPTIONS on any API route answers 200 with an empty body
pub async fn options_ok() -> StatusCode {
    StatusCode::OK
}

/// Router fallback for unknown paths
pub async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
