//! # Metrics Handlers
//!
//! Query parameters are parsed leniently: an unknown `timeRange` falls back
//! to `24h` and an unknown `groupBy` to `day`.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::constants;
use crate::metrics::{ActivityItem, CostReport, DashboardMetrics, GroupBy, TimeRange, TrendReport};
use crate::web::response_types::{ApiResponse, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    pub time_range: Option<String>,
    pub group_by: Option<String>,
    pub limit: Option<i64>,
}

impl MetricsQuery {
    fn time_range(&self) -> TimeRange {
        TimeRange::parse_lenient(self.time_range.as_deref())
    }

    fn group_by(&self) -> GroupBy {
        GroupBy::parse_lenient(self.group_by.as_deref())
    }

    fn activity_limit(&self) -> usize {
        self.limit
            .map(|limit| limit.clamp(1, constants::metrics::MAX_RECENT_ACTIVITY_PAGE_SIZE as i64) as usize)
            .unwrap_or(constants::metrics::DEFAULT_RECENT_ACTIVITY_PAGE_SIZE)
    }
}

/// Dashboard summary: GET /api/metrics/dashboard
///
/// Sections whose query failed come back empty and are listed in
/// `degradedSections`.
pub async fn dashboard(
    State(state): State<AppState>,
    query: Result<Query<MetricsQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<DashboardMetrics>>> {
    let Query(query) = query?;
    let metrics = state.metrics.dashboard(query.time_range()).await;
    Ok(ApiResponse::ok(metrics))
}

/// Execution and error trends: GET /api/metrics/trends
pub async fn trends(
    State(state): State<AppState>,
    query: Result<Query<MetricsQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<TrendReport>>> {
    let Query(query) = query?;
    let report = state
        .metrics
        .trends(query.time_range(), query.group_by())
        .await
        .map_err(|e| state.api_error(e))?;
    Ok(ApiResponse::ok(report))
}

/// Cost breakdown: GET /api/metrics/costs
pub async fn costs(
    State(state): State<AppState>,
    query: Result<Query<MetricsQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<CostReport>>> {
    let Query(query) = query?;
    let report = state
        .metrics
        .costs(query.time_range())
        .await
        .map_err(|e| state.api_error(e))?;
    Ok(ApiResponse::ok(report))
}

/// Recent activity feed: GET /api/metrics/activity
pub async fn activity(
    State(state): State<AppState>,
    query: Result<Query<MetricsQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Vec<ActivityItem>>>> {
    let Query(query) = query?;
    let items = state
        .metrics
        .activity(query.activity_limit())
        .await
        .map_err(|e| state.api_error(e))?;
    Ok(ApiResponse::ok(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_query_defaults() {
        let query = MetricsQuery {
            time_range: Some("forever".to_string()),
            group_by: Some("minute".to_string()),
            limit: None,
        };
        assert_eq!(query.time_range(), TimeRange::Last24Hours);
        assert_eq!(query.group_by(), GroupBy::Day);
        assert_eq!(query.activity_limit(), 20);
    }

    #[test]
    fn test_activity_limit_is_clamped() {
        let query = MetricsQuery {
            limit: Some(5_000),
            ..MetricsQuery::default()
        };
        assert_eq!(query.activity_limit(), 200);

        let query = MetricsQuery {
            limit: Some(-3),
            ..MetricsQuery::default()
        };
        assert_eq!(query.activity_limit(), 1);
    }
}
