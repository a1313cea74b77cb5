//! Store-backed metrics rollups.
//!
//! The dashboard runs its five rollups concurrently. A rollup whose query
//! fails is logged, replaced by its empty default and named in
//! `degraded_sections`, so the dashboard itself never fails. The
//! single-purpose reports propagate store errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::aggregation::{
    cost_summary, error_stats, error_trend, execution_stats, execution_trend,
    lead_status_distribution, merge_activity, ActivityItem, CostSummary, ErrorStats,
    ErrorTrendPoint, ExecutionStats, ExecutionTrendPoint, LeadStatusDistribution,
};
use super::time_range::{GroupBy, TimeRange};
use crate::config::MetricsConfig;
use crate::constants;
use crate::error::LeadflowResult;
use crate::logging::log_store_operation;
use crate::status::{errors_by_lead, recent_error_cutoff};
use crate::store::LeadStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub time_range: TimeRange,
    pub generated_at: DateTime<Utc>,
    pub executions: ExecutionStats,
    pub errors: ErrorStats,
    pub lead_status: LeadStatusDistribution,
    pub costs: CostSummary,
    pub recent_activity: Vec<ActivityItem>,
    pub degraded_sections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub time_range: TimeRange,
    pub group_by: GroupBy,
    pub executions: Vec<ExecutionTrendPoint>,
    pub errors: Vec<ErrorTrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostReport {
    pub time_range: TimeRange,
    #[serde(flatten)]
    pub summary: CostSummary,
}

#[derive(Debug, Clone)]
pub struct MetricsService {
    store: Arc<dyn LeadStore>,
    config: MetricsConfig,
}

impl MetricsService {
    pub fn new(store: Arc<dyn LeadStore>, config: MetricsConfig) -> Self {
        Self { store, config }
    }

    pub async fn dashboard(&self, time_range: TimeRange) -> DashboardMetrics {
        let now = Utc::now();
        let since = time_range.since(now);

        let (executions, errors, lead_status, costs, recent_activity) = tokio::join!(
            self.execution_rollup(since),
            self.error_rollup(since),
            self.lead_status_rollup(now),
            self.cost_rollup(since),
            self.recent_activity(
                self.config.recent_activity_per_source,
                self.config.recent_activity_page_size
            ),
        );

        let mut degraded_sections = Vec::new();
        let executions = degrade("executions", executions, &mut degraded_sections);
        let errors = degrade("errors", errors, &mut degraded_sections);
        let lead_status = degrade("lead_status", lead_status, &mut degraded_sections);
        let costs = degrade("costs", costs, &mut degraded_sections);
        let recent_activity = degrade("recent_activity", recent_activity, &mut degraded_sections);

        debug!(
            time_range = %time_range,
            degraded = degraded_sections.len(),
            "Built dashboard metrics"
        );

        DashboardMetrics {
            time_range,
            generated_at: now,
            executions,
            errors,
            lead_status,
            costs,
            recent_activity,
            degraded_sections,
        }
    }

    pub async fn trends(&self, time_range: TimeRange, group_by: GroupBy) -> LeadflowResult<TrendReport> {
        let since = time_range.since(Utc::now());
        let (executions, errors) = tokio::try_join!(
            self.store.executions_since(since),
            self.store.errors_since(since),
        )?;

        Ok(TrendReport {
            time_range,
            group_by,
            executions: execution_trend(&executions, group_by),
            errors: error_trend(&errors, group_by),
        })
    }

    pub async fn costs(&self, time_range: TimeRange) -> LeadflowResult<CostReport> {
        let summary = self.cost_rollup(time_range.since(Utc::now())).await?;
        Ok(CostReport {
            time_range,
            summary,
        })
    }

    /// Merged feed of the `limit` most recent executions and errors
    pub async fn activity(&self, limit: usize) -> LeadflowResult<Vec<ActivityItem>> {
        let limit = limit.clamp(1, constants::metrics::MAX_RECENT_ACTIVITY_PAGE_SIZE);
        self.recent_activity(limit, limit).await
    }

    // =========================================================================
    // Rollups
    // =========================================================================

    async fn execution_rollup(&self, since: DateTime<Utc>) -> LeadflowResult<ExecutionStats> {
        let executions = self.store.executions_since(since).await?;
        Ok(execution_stats(&executions))
    }

    async fn error_rollup(&self, since: DateTime<Utc>) -> LeadflowResult<ErrorStats> {
        let errors = self.store.errors_since(since).await?;
        Ok(error_stats(&errors))
    }

    async fn lead_status_rollup(&self, now: DateTime<Utc>) -> LeadflowResult<LeadStatusDistribution> {
        let (total_leads, statuses, errors) = tokio::try_join!(
            self.store.count_leads(None),
            self.store.all_processing_statuses(),
            self.store
                .lead_error_times_since(None, recent_error_cutoff(now)),
        )?;
        Ok(lead_status_distribution(
            total_leads,
            &statuses,
            &errors_by_lead(&errors),
            now,
        ))
    }

    async fn cost_rollup(&self, since: DateTime<Utc>) -> LeadflowResult<CostSummary> {
        let usage = self.store.api_usage_since(since).await?;
        Ok(cost_summary(&usage))
    }

    async fn recent_activity(
        &self,
        per_source: usize,
        page_size: usize,
    ) -> LeadflowResult<Vec<ActivityItem>> {
        let limit = per_source as i64;
        let (executions, errors) = tokio::try_join!(
            self.store.recent_executions(limit),
            self.store.recent_errors(limit),
        )?;

        Ok(merge_activity(
            vec![
                executions.iter().map(ActivityItem::from).collect(),
                errors.iter().map(ActivityItem::from).collect(),
            ],
            per_source,
            page_size,
        ))
    }
}

fn degrade<T: Default>(
    section: &str,
    result: LeadflowResult<T>,
    degraded_sections: &mut Vec<String>,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            log_store_operation("dashboard", section, &e.to_string());
            degraded_sections.push(section.to_string());
            T::default()
        }
    }
}
