//! # Lead Handlers
//!
//! List and detail views plus the batch sync lookup. Overall status always
//! comes from [`derive_status`], and status and error lookups are batched per
//! page rather than issued per lead.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants;
use crate::models::{
    Lead, LeadListFilter, LeadProcessingStatus, LeadSource, PipelineStages, Stage, WorkflowError,
};
use crate::status::{derive_status, errors_by_lead, recent_error_cutoff, DerivedStatus, OverallStatus};
use crate::sync::SyncStatus;
use crate::web::response_types::{ApiError, ApiResponse, ApiResult, Pagination};
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LeadListQuery {
    pub source: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl LeadListQuery {
    fn into_filter(self) -> ApiResult<LeadListFilter> {
        let lead_source = self
            .source
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<LeadSource>)
            .transpose()
            .map_err(ApiError::bad_request)?;

        Ok(LeadListFilter {
            lead_source,
            limit: self
                .limit
                .unwrap_or(constants::pagination::DEFAULT_LIMIT)
                .clamp(1, constants::pagination::MAX_LIMIT),
            offset: self.offset.unwrap_or(0).max(0),
        })
    }
}

/// One row of the list view
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSummary {
    #[serde(flatten)]
    pub lead: Lead,
    pub overall_status: OverallStatus,
    pub active_stage: Option<Stage>,
    pub failed_stage: Option<Stage>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDetail {
    #[serde(flatten)]
    pub lead: Lead,
    pub processing_status: Option<LeadProcessingStatus>,
    pub overall_status: OverallStatus,
    pub active_stage: Option<Stage>,
    pub failed_stage: Option<Stage>,
    pub has_recent_error: bool,
    pub sync_status: SyncStatus,
    pub recent_errors: Vec<WorkflowError>,
}

/// List leads: GET /api/leads
pub async fn list_leads(
    State(state): State<AppState>,
    query: Result<Query<LeadListQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Vec<LeadSummary>>>> {
    let Query(query) = query?;
    let filter = query.into_filter()?;
    debug!(source = ?filter.lead_source, limit = filter.limit, offset = filter.offset, "Listing leads");

    let (leads, total) = state
        .store
        .list_leads(&filter)
        .await
        .map_err(|e| state.api_error(e))?;

    let mut ids_by_source: HashMap<LeadSource, Vec<Uuid>> = HashMap::new();
    for lead in &leads {
        ids_by_source.entry(lead.lead_source).or_default().push(lead.id);
    }

    let mut stages: HashMap<(Uuid, LeadSource), PipelineStages> = HashMap::new();
    for (source, ids) in &ids_by_source {
        let rows = state
            .store
            .processing_statuses(*source, ids)
            .await
            .map_err(|e| state.api_error(e))?;
        stages.extend(rows.into_iter().map(|row| (row.key(), row.stages)));
    }

    let now = Utc::now();
    let all_ids: Vec<Uuid> = leads.iter().map(|lead| lead.id).collect();
    let errors = if all_ids.is_empty() {
        HashMap::new()
    } else {
        let times = state
            .store
            .lead_error_times_since(Some(&all_ids), recent_error_cutoff(now))
            .await
            .map_err(|e| state.api_error(e))?;
        errors_by_lead(&times)
    };

    let summaries: Vec<LeadSummary> = leads
        .into_iter()
        .map(|lead| {
            let recent = errors.get(&lead.id).map(Vec::as_slice).unwrap_or_default();
            let derived = derive_status(stages.get(&(lead.id, lead.lead_source)), recent, now);
            let sync_status = SyncStatus::for_lead(&lead);
            LeadSummary {
                lead,
                overall_status: derived.status,
                active_stage: derived.active_stage,
                failed_stage: derived.failed_stage,
                sync_status,
            }
        })
        .collect();

    let pagination = Pagination::new(total, filter.limit, filter.offset);
    Ok(ApiResponse::paginated(summaries, pagination))
}

/// Lead detail: GET /api/leads/:source/:id
pub async fn get_lead(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> ApiResult<Json<ApiResponse<LeadDetail>>> {
    let Path((source, id)) = path?;
    let lead_source: LeadSource = source.parse().map_err(ApiError::bad_request)?;
    let lead_id =
        Uuid::parse_str(&id).map_err(|_| ApiError::bad_request(format!("Invalid lead id: {id}")))?;

    let lead = state
        .store
        .find_lead(lead_source, lead_id)
        .await
        .map_err(|e| state.api_error(e))?
        .ok_or_else(|| ApiError::NotFound {
            message: "Lead not found".to_string(),
            details: Some(serde_json::json!({
                "lead_source": lead_source,
                "missing_ids": [lead_id],
            })),
        })?;

    let now = Utc::now();
    let ids = [lead_id];
    let (statuses, error_times, recent_errors) = tokio::try_join!(
        state.store.processing_statuses(lead_source, &ids),
        state
            .store
            .lead_error_times_since(Some(&ids), recent_error_cutoff(now)),
        state
            .store
            .lead_errors(lead_id, constants::pagination::LEAD_DETAIL_ERROR_LIMIT),
    )
    .map_err(|e| state.api_error(e))?;

    let processing_status = statuses.into_iter().next();
    let recent: Vec<_> = error_times.iter().map(|e| e.occurred_at).collect();
    let DerivedStatus {
        status,
        active_stage,
        failed_stage,
        has_recent_error,
    } = derive_status(processing_status.as_ref().map(|row| &row.stages), &recent, now);

    let sync_status = SyncStatus::for_lead(&lead);
    Ok(ApiResponse::ok(LeadDetail {
        lead,
        processing_status,
        overall_status: status,
        active_stage,
        failed_stage,
        has_recent_error,
        sync_status,
        recent_errors,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SyncStatusRequest {
    #[serde(default)]
    pub emails: Vec<String>,
}

/// Batch sync status: POST /api/leads/sync-status
pub async fn sync_status(
    State(state): State<AppState>,
    body: Result<Json<SyncStatusRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<HashMap<String, SyncStatus>>>> {
    let Json(request) = body?;
    let emails: Vec<String> = request
        .emails
        .into_iter()
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
        .collect();
    if emails.is_empty() {
        return Err(ApiError::bad_request("emails must contain at least one address"));
    }

    let statuses = state
        .sync
        .check_sync(&emails)
        .await
        .map_err(|e| state.api_error(e))?;

    info!(
        requested = emails.len(),
        synced = statuses.values().filter(|s| s.overall_synced).count(),
        "Resolved lead sync status"
    );
    Ok(ApiResponse::ok(statuses))
}
