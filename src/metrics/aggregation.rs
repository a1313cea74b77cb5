//! Pure rollups over store rows.
//!
//! Nothing here touches the store, so every function can be tested against
//! hand-built rows. Costs keep full precision until they are placed in an
//! output struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use super::time_range::GroupBy;
use crate::models::{
    ApiUsage, ExecutionStatus, LeadProcessingStatus, Severity, WorkflowError, WorkflowExecution,
};
use crate::status::{derive_status, OverallStatus};

/// `round(numerator / denominator * 100)`, or 0 when the denominator is 0
pub fn percentage(numerator: f64, denominator: f64) -> i64 {
    if denominator == 0.0 {
        return 0;
    }
    (numerator / denominator * 100.0).round() as i64
}

/// Round a cost to cents for output
pub fn round_cost(cost: f64) -> f64 {
    (cost * 100.0).round() / 100.0
}

// =============================================================================
// Executions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub running: i64,
    pub success_rate: i64,
    pub average_duration_seconds: Option<f64>,
    pub leads_processed: i64,
}

pub fn execution_stats(executions: &[WorkflowExecution]) -> ExecutionStats {
    let mut stats = ExecutionStats {
        total: executions.len() as i64,
        ..ExecutionStats::default()
    };

    let mut duration_sum = 0.0;
    let mut duration_count = 0usize;
    for execution in executions {
        match execution.status {
            ExecutionStatus::Completed => stats.completed += 1,
            ExecutionStatus::Failed => stats.failed += 1,
            ExecutionStatus::Started => stats.running += 1,
        }
        stats.leads_processed += i64::from(execution.leads_processed);
        if let Some(seconds) = execution.duration_seconds() {
            duration_sum += seconds;
            duration_count += 1;
        }
    }

    stats.success_rate = percentage(stats.completed as f64, stats.total as f64);
    stats.average_duration_seconds =
        (duration_count > 0).then(|| (duration_sum / duration_count as f64 * 10.0).round() / 10.0);
    stats
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountBreakdown {
    pub name: String,
    pub count: i64,
    pub percentage: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total: i64,
    /// Every severity is present, zero when unseen
    pub by_severity: BTreeMap<Severity, i64>,
    pub by_workflow: Vec<CountBreakdown>,
    pub by_type: Vec<CountBreakdown>,
    pub affected_leads: i64,
}

impl Default for ErrorStats {
    fn default() -> Self {
        Self {
            total: 0,
            by_severity: Severity::ALL.iter().map(|s| (*s, 0)).collect(),
            by_workflow: Vec::new(),
            by_type: Vec::new(),
            affected_leads: 0,
        }
    }
}

fn count_breakdown<'a>(names: impl Iterator<Item = &'a str>) -> Vec<CountBreakdown> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    let total: i64 = counts.values().sum();

    let mut breakdown: Vec<CountBreakdown> = counts
        .into_iter()
        .map(|(name, count)| CountBreakdown {
            name: name.to_string(),
            count,
            percentage: percentage(count as f64, total as f64),
        })
        .collect();
    breakdown.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    breakdown
}

pub fn error_stats(errors: &[WorkflowError]) -> ErrorStats {
    let mut stats = ErrorStats {
        total: errors.len() as i64,
        ..ErrorStats::default()
    };

    for error in errors {
        *stats.by_severity.entry(error.severity).or_default() += 1;
    }
    stats.by_workflow = count_breakdown(errors.iter().map(|e| e.workflow_name.as_str()));
    stats.by_type = count_breakdown(errors.iter().map(|e| e.error_type.as_str()));
    stats.affected_leads = errors
        .iter()
        .filter_map(|e| e.lead_id)
        .collect::<HashSet<_>>()
        .len() as i64;
    stats
}

// =============================================================================
// Lead status distribution
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadStatusDistribution {
    pub total: i64,
    /// Every overall status is present, zero when unseen
    pub counts: BTreeMap<OverallStatus, i64>,
    pub percentages: BTreeMap<OverallStatus, i64>,
}

impl Default for LeadStatusDistribution {
    fn default() -> Self {
        let zeros: BTreeMap<OverallStatus, i64> =
            OverallStatus::ALL.iter().map(|s| (*s, 0)).collect();
        Self {
            total: 0,
            counts: zeros.clone(),
            percentages: zeros,
        }
    }
}

/// Classify every lead through status derivation.
///
/// `statuses` must hold only rows of existing leads (at most one per lead, as
/// [`LeadStore::all_processing_statuses`](crate::store::LeadStore::all_processing_statuses)
/// returns them). Leads without a row are `not_started`: their count is
/// `total_leads` minus the rows seen, never negative.
pub fn lead_status_distribution(
    total_leads: i64,
    statuses: &[LeadProcessingStatus],
    recent_errors: &HashMap<Uuid, Vec<DateTime<Utc>>>,
    now: DateTime<Utc>,
) -> LeadStatusDistribution {
    let mut distribution = LeadStatusDistribution::default();

    for row in statuses {
        let errors = recent_errors
            .get(&row.lead_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let derived = derive_status(Some(&row.stages), errors, now);
        *distribution.counts.entry(derived.status).or_default() += 1;
    }

    let not_started = (total_leads - statuses.len() as i64).max(0);
    *distribution
        .counts
        .entry(OverallStatus::NotStarted)
        .or_default() += not_started;

    distribution.total = distribution.counts.values().sum();
    let total = distribution.total as f64;
    distribution.percentages = distribution
        .counts
        .iter()
        .map(|(status, count)| (*status, percentage(*count as f64, total)))
        .collect();
    distribution
}

// =============================================================================
// Costs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub name: String,
    pub cost: f64,
    pub tokens: i64,
    pub calls: i64,
    /// Share of this dimension's own total cost
    pub percentage: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    pub total_cost: f64,
    pub total_tokens: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub call_count: i64,
    pub average_cost_per_call: f64,
    pub by_model: Vec<CostBreakdown>,
    pub by_service: Vec<CostBreakdown>,
    pub by_workflow: Vec<CostBreakdown>,
}

#[derive(Default)]
struct CostAccumulator {
    cost: f64,
    tokens: i64,
    calls: i64,
}

const UNATTRIBUTED_WORKFLOW: &str = "unattributed";

fn cost_breakdown<'a, F>(usage: &'a [ApiUsage], dimension: F) -> Vec<CostBreakdown>
where
    F: Fn(&'a ApiUsage) -> &'a str,
{
    let mut groups: HashMap<&str, CostAccumulator> = HashMap::new();
    for row in usage {
        let group = groups.entry(dimension(row)).or_default();
        group.cost += row.total_cost;
        group.tokens += row.total_tokens;
        group.calls += 1;
    }
    let dimension_total: f64 = groups.values().map(|g| g.cost).sum();

    let mut breakdown: Vec<CostBreakdown> = groups
        .into_iter()
        .map(|(name, group)| CostBreakdown {
            name: name.to_string(),
            cost: round_cost(group.cost),
            tokens: group.tokens,
            calls: group.calls,
            percentage: percentage(group.cost, dimension_total),
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.cost
            .total_cmp(&a.cost)
            .then_with(|| a.name.cmp(&b.name))
    });
    breakdown
}

pub fn cost_summary(usage: &[ApiUsage]) -> CostSummary {
    let total_cost: f64 = usage.iter().map(|u| u.total_cost).sum();
    let call_count = usage.len() as i64;

    CostSummary {
        total_cost: round_cost(total_cost),
        total_tokens: usage.iter().map(|u| u.total_tokens).sum(),
        input_tokens: usage.iter().map(|u| u.input_tokens).sum(),
        output_tokens: usage.iter().map(|u| u.output_tokens).sum(),
        call_count,
        average_cost_per_call: if call_count == 0 {
            0.0
        } else {
            round_cost(total_cost / call_count as f64)
        },
        by_model: cost_breakdown(usage, |u| u.model_name.as_str()),
        by_service: cost_breakdown(usage, |u| u.api_service.as_str()),
        by_workflow: cost_breakdown(usage, |u| {
            u.workflow_name.as_deref().unwrap_or(UNATTRIBUTED_WORKFLOW)
        }),
    }
}

// =============================================================================
// Trends
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTrendPoint {
    pub bucket: String,
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTrendPoint {
    pub bucket: String,
    pub total: i64,
    pub critical: i64,
}

/// Executions per bucket; buckets without executions are omitted
pub fn execution_trend(executions: &[WorkflowExecution], group_by: GroupBy) -> Vec<ExecutionTrendPoint> {
    let mut buckets: BTreeMap<String, ExecutionTrendPoint> = BTreeMap::new();
    for execution in executions {
        let key = group_by.bucket_key(execution.started_at);
        let point = buckets
            .entry(key.clone())
            .or_insert_with(|| ExecutionTrendPoint {
                bucket: key,
                total: 0,
                completed: 0,
                failed: 0,
            });
        point.total += 1;
        match execution.status {
            ExecutionStatus::Completed => point.completed += 1,
            ExecutionStatus::Failed => point.failed += 1,
            ExecutionStatus::Started => {}
        }
    }
    buckets.into_values().collect()
}

/// Errors per bucket; buckets without errors are omitted
pub fn error_trend(errors: &[WorkflowError], group_by: GroupBy) -> Vec<ErrorTrendPoint> {
    let mut buckets: BTreeMap<String, ErrorTrendPoint> = BTreeMap::new();
    for error in errors {
        let key = group_by.bucket_key(error.occurred_at);
        let point = buckets.entry(key.clone()).or_insert_with(|| ErrorTrendPoint {
            bucket: key,
            total: 0,
            critical: 0,
        });
        point.total += 1;
        if error.severity == Severity::Critical {
            point.critical += 1;
        }
    }
    buckets.into_values().collect()
}

// =============================================================================
// Recent activity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Execution,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub kind: ActivityKind,
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub workflow_name: String,
    pub summary: String,
    pub status: String,
}

impl From<&WorkflowExecution> for ActivityItem {
    fn from(execution: &WorkflowExecution) -> Self {
        let summary = match &execution.campaign_name {
            Some(campaign) => format!(
                "{} ({campaign}): {} lead(s)",
                execution.workflow_name, execution.leads_processed
            ),
            None => format!(
                "{}: {} lead(s)",
                execution.workflow_name, execution.leads_processed
            ),
        };
        Self {
            kind: ActivityKind::Execution,
            id: execution.id,
            timestamp: execution.started_at,
            workflow_name: execution.workflow_name.clone(),
            summary,
            status: execution.status.to_string(),
        }
    }
}

impl From<&WorkflowError> for ActivityItem {
    fn from(error: &WorkflowError) -> Self {
        let location = error.node_name.as_deref().unwrap_or("unknown node");
        let summary = match &error.error_message {
            Some(message) => format!("{} at {location}: {message}", error.error_type),
            None => format!("{} at {location}", error.error_type),
        };
        Self {
            kind: ActivityKind::Error,
            id: error.id,
            timestamp: error.occurred_at,
            workflow_name: error.workflow_name.clone(),
            summary,
            status: error.severity.to_string(),
        }
    }
}

/// Truncate each source to `per_source`, merge, sort newest first, truncate to `page_size`
pub fn merge_activity(
    sources: Vec<Vec<ActivityItem>>,
    per_source: usize,
    page_size: usize,
) -> Vec<ActivityItem> {
    let mut merged: Vec<ActivityItem> = sources
        .into_iter()
        .flat_map(|mut items| {
            items.sort_by_key(|item| Reverse(item.timestamp));
            items.truncate(per_source);
            items
        })
        .collect();
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    merged.truncate(page_size);
    merged
}
