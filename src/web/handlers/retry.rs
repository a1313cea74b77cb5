//! # Retry Handler

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::warn;

use crate::retry::{RawRetryRequest, RetryOutcome, RetryRequest};
use crate::web::response_types::{ApiResponse, ApiResult};
use crate::web::state::AppState;

/// Queue a retry batch: POST /api/leads/retry
///
/// Validation failures answer 400 and unknown leads 404 before anything is
/// written. Once the batch is accepted the response is always a success
/// envelope; partial write failures and webhook failures are reported
/// inside the outcome.
pub async fn retry_leads(
    State(state): State<AppState>,
    body: Result<Json<RawRetryRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<RetryOutcome>>> {
    let Json(raw) = body?;
    let request = RetryRequest::try_from(raw).map_err(|e| state.api_error(e))?;

    let outcome = state
        .retry
        .retry(request)
        .await
        .map_err(|e| state.api_error(e))?;

    if !outcome.is_clean() {
        warn!(
            lead_source = %outcome.lead_source,
            step_failures = outcome.step_failures.len(),
            webhook_triggered = outcome.webhook.triggered,
            "Retry batch queued with failures"
        );
    }
    Ok(ApiResponse::ok(outcome))
}
