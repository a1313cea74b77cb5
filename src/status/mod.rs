//! # Status Derivation
//!
//! Maps a lead's three stage statuses plus its recent error history to one
//! canonical lifecycle status. The list view, the detail view, the retry
//! validator and the metrics rollups all call [`derive_status`], so a lead can
//! never appear in contradictory states across screens.
//!
//! ## Precedence (first match wins)
//!
//! 1. no processing-status row → `not_started`
//! 2. an error within the last 60 minutes → `failed`
//! 3. `database_update` completed → `completed`
//! 4. any stage failed → `failed`
//! 5. any stage in progress → `processing`
//! 6. otherwise → `pending`
//!
//! Rule 2 lets a fresh error surface on a lead whose stage columns still say
//! `completed`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::constants;
use crate::models::{LeadErrorTime, PipelineStages, Stage, StageStatus};

/// Canonical lifecycle status reported to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    NotStarted,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OverallStatus {
    pub const ALL: [OverallStatus; 5] = [
        OverallStatus::NotStarted,
        OverallStatus::Pending,
        OverallStatus::Processing,
        OverallStatus::Completed,
        OverallStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OverallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid overall status: {s}")),
        }
    }
}

/// Overall status plus the stage context secondary views display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedStatus {
    pub status: OverallStatus,
    /// First in-progress stage, checked database_update → outreach → research
    pub active_stage: Option<Stage>,
    /// Earliest failed stage in pipeline order
    pub failed_stage: Option<Stage>,
    pub has_recent_error: bool,
}

/// Order in which in-progress stages are surfaced
const ACTIVE_STAGE_ORDER: [Stage; 3] = [Stage::DatabaseUpdate, Stage::Outreach, Stage::Research];

/// Whether an error at `occurred_at` is inside the recency window ending at `now`.
///
/// Timestamps ahead of `now` (clock skew between writers) count as recent.
pub fn is_recent_error(occurred_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(occurred_at)
        < Duration::minutes(constants::status::RECENT_ERROR_WINDOW_MINUTES)
}

/// Start of the recency window ending at `now`
pub fn recent_error_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::minutes(constants::status::RECENT_ERROR_WINDOW_MINUTES)
}

/// Derive the overall status alone.
pub fn derive_overall_status(
    stages: Option<&PipelineStages>,
    recent_errors: &[DateTime<Utc>],
    now: DateTime<Utc>,
) -> OverallStatus {
    derive_status(stages, recent_errors, now).status
}

/// Derive the overall status and its stage context.
///
/// `stages` is `None` when the lead has no processing-status row.
pub fn derive_status(
    stages: Option<&PipelineStages>,
    recent_errors: &[DateTime<Utc>],
    now: DateTime<Utc>,
) -> DerivedStatus {
    let Some(stages) = stages else {
        return DerivedStatus {
            status: OverallStatus::NotStarted,
            active_stage: None,
            failed_stage: None,
            has_recent_error: false,
        };
    };

    let has_recent_error = recent_errors.iter().any(|at| is_recent_error(*at, now));
    let failed_stage = Stage::PIPELINE_ORDER
        .into_iter()
        .find(|stage| stages.status(*stage) == StageStatus::Failed);
    let active_stage = ACTIVE_STAGE_ORDER
        .into_iter()
        .find(|stage| stages.status(*stage) == StageStatus::InProgress);

    let status = if has_recent_error {
        OverallStatus::Failed
    } else if stages.database_update.status == StageStatus::Completed {
        OverallStatus::Completed
    } else if failed_stage.is_some() {
        OverallStatus::Failed
    } else if active_stage.is_some() {
        OverallStatus::Processing
    } else {
        OverallStatus::Pending
    };

    DerivedStatus {
        status,
        active_stage,
        failed_stage,
        has_recent_error,
    }
}

/// Group error timestamps by lead for batch derivation
pub fn errors_by_lead(errors: &[LeadErrorTime]) -> HashMap<Uuid, Vec<DateTime<Utc>>> {
    let mut grouped: HashMap<Uuid, Vec<DateTime<Utc>>> = HashMap::new();
    for error in errors {
        grouped
            .entry(error.lead_id)
            .or_default()
            .push(error.occurred_at);
    }
    grouped
}
