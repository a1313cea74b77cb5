//! # Metrics Aggregation
//!
//! Rolls lead, execution, error and API usage rows up into dashboard
//! summaries. [`aggregation`] holds the pure rollups, [`service`] runs them
//! against the store.
//!
//! Conventions shared by every rollup:
//!
//! - percentages are `round(n / d * 100)`, 0 when `d == 0`
//! - costs are summed at full precision and rounded to cents on output
//! - trend series are sparse and keyed by UTC day or hour
//! - each breakdown dimension divides by its own total

pub mod aggregation;
pub mod service;
pub mod time_range;

pub use aggregation::{
    percentage, round_cost, ActivityItem, ActivityKind, CostBreakdown, CostSummary,
    CountBreakdown, ErrorStats, ErrorTrendPoint, ExecutionStats, ExecutionTrendPoint,
    LeadStatusDistribution,
};
pub use service::{CostReport, DashboardMetrics, MetricsService, TrendReport};
pub use time_range::{GroupBy, TimeRange};
