//! Retry policy: which stage state a retry type resets.
//!
//! Every [`RetryType`] maps to a complete [`StageReset`] through an exhaustive
//! match, so a new retry type cannot be added without deciding every field.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::FromFailureMode;
use crate::models::{Lead, PipelineStages, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryType {
    /// Re-run the whole pipeline
    Full,
    /// Re-run from the failed stage onwards
    FromFailure,
    ResearchOnly,
    OutreachOnly,
}

impl RetryType {
    pub const ALL: [RetryType; 4] = [
        RetryType::Full,
        RetryType::FromFailure,
        RetryType::ResearchOnly,
        RetryType::OutreachOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::FromFailure => "from_failure",
            Self::ResearchOnly => "research_only",
            Self::OutreachOnly => "outreach_only",
        }
    }

    /// Stage fields this retry type resets.
    ///
    /// `failed_stage` is the earliest failed stage of the lead, as reported by
    /// status derivation. It only matters for `from_failure` in
    /// [`FromFailureMode::Pipeline`]; the default mode resets everything.
    pub fn stage_reset(&self, mode: FromFailureMode, failed_stage: Option<Stage>) -> StageReset {
        match self {
            Self::Full => StageReset::ALL_STAGES,
            Self::FromFailure => match (mode, failed_stage) {
                (FromFailureMode::Full, _) | (FromFailureMode::Pipeline, None) => {
                    StageReset::ALL_STAGES
                }
                (FromFailureMode::Pipeline, Some(stage)) => StageReset::from_stage_onwards(stage),
            },
            Self::ResearchOnly => StageReset::only(Stage::Research),
            Self::OutreachOnly => StageReset::only(Stage::Outreach),
        }
    }

    /// Whether this retry may hand the lead to a delivery platform again
    pub fn reruns_outreach(&self) -> bool {
        match self {
            Self::Full | Self::FromFailure | Self::OutreachOnly => true,
            Self::ResearchOnly => false,
        }
    }
}

impl fmt::Display for RetryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RetryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "from_failure" => Ok(Self::FromFailure),
            "research_only" => Ok(Self::ResearchOnly),
            "outreach_only" => Ok(Self::OutreachOnly),
            _ => Err(format!(
                "Invalid retry type: {s} (expected one of full, from_failure, research_only, outreach_only)"
            )),
        }
    }
}

/// Stage fields reset by one retry.
///
/// Resetting a stage sets it to `pending` and clears its timestamps and error.
/// `clear_errors` additionally clears the lead-level `last_error`,
/// `last_error_node` and `error_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageReset {
    pub research: bool,
    pub outreach: bool,
    pub database_update: bool,
    pub clear_errors: bool,
}

impl StageReset {
    pub const ALL_STAGES: StageReset = StageReset {
        research: true,
        outreach: true,
        database_update: true,
        clear_errors: true,
    };

    pub fn only(stage: Stage) -> Self {
        let mut reset = Self {
            research: false,
            outreach: false,
            database_update: false,
            clear_errors: false,
        };
        reset.set(stage, true);
        reset
    }

    /// `stage` and every stage after it in pipeline order
    pub fn from_stage_onwards(stage: Stage) -> Self {
        let mut reset = Self::only(stage);
        for later in Stage::PIPELINE_ORDER
            .into_iter()
            .filter(|s| s.position() > stage.position())
        {
            reset.set(later, true);
        }
        reset.clear_errors = true;
        reset
    }

    pub fn resets(&self, stage: Stage) -> bool {
        match stage {
            Stage::Research => self.research,
            Stage::Outreach => self.outreach,
            Stage::DatabaseUpdate => self.database_update,
        }
    }

    fn set(&mut self, stage: Stage, value: bool) {
        match stage {
            Stage::Research => self.research = value,
            Stage::Outreach => self.outreach = value,
            Stage::DatabaseUpdate => self.database_update = value,
        }
    }

    /// Stages this reset touches, in pipeline order
    pub fn stages(&self) -> Vec<Stage> {
        Stage::PIPELINE_ORDER
            .into_iter()
            .filter(|stage| self.resets(*stage))
            .collect()
    }

    pub fn apply_to_stages(&self, stages: &mut PipelineStages) {
        for stage in self.stages() {
            stages.get_mut(stage).reset();
        }
    }

    /// Apply to a lead row (stage columns and, when requested, error bookkeeping)
    pub fn apply_to_lead(&self, lead: &mut Lead) {
        self.apply_to_stages(&mut lead.stages);
        if self.clear_errors {
            lead.last_error = None;
            lead.last_error_node = None;
            lead.error_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeadSource, StageRecord, StageStatus};
    use chrono::Utc;

    fn failed_record() -> StageRecord {
        StageRecord {
            status: StageStatus::Failed,
            started_at: Some(Utc::now()),
            completed_at: None,
            error: Some("rate limited".to_string()),
        }
    }

    #[test]
    fn test_full_resets_everything() {
        let reset = RetryType::Full.stage_reset(FromFailureMode::Full, None);
        assert_eq!(reset, StageReset::ALL_STAGES);
    }

    #[test]
    fn test_from_failure_defaults_to_full_reset() {
        let reset = RetryType::FromFailure.stage_reset(FromFailureMode::Full, Some(Stage::Outreach));
        assert_eq!(reset, StageReset::ALL_STAGES);
    }

    #[test]
    fn test_from_failure_pipeline_mode_keeps_earlier_stages() {
        let reset =
            RetryType::FromFailure.stage_reset(FromFailureMode::Pipeline, Some(Stage::Outreach));
        assert!(!reset.research);
        assert!(reset.outreach);
        assert!(reset.database_update);
        assert!(reset.clear_errors);
    }

    #[test]
    fn test_from_failure_pipeline_mode_without_failure_resets_all() {
        let reset = RetryType::FromFailure.stage_reset(FromFailureMode::Pipeline, None);
        assert_eq!(reset, StageReset::ALL_STAGES);
    }

    #[test]
    fn test_single_stage_retries_leave_errors() {
        let research = RetryType::ResearchOnly.stage_reset(FromFailureMode::Full, None);
        assert_eq!(research.stages(), vec![Stage::Research]);
        assert!(!research.clear_errors);

        let outreach = RetryType::OutreachOnly.stage_reset(FromFailureMode::Full, None);
        assert_eq!(outreach.stages(), vec![Stage::Outreach]);
    }

    #[test]
    fn test_apply_to_lead_only_touches_selected_stages() {
        let mut lead = Lead::new(LeadSource::Apollo, "ada@example.com");
        lead.stages.research = failed_record();
        lead.stages.outreach = StageRecord::with_status(StageStatus::Completed);
        lead.last_error = Some("rate limited".to_string());
        lead.error_count = 3;

        StageReset::only(Stage::Research).apply_to_lead(&mut lead);

        assert_eq!(lead.stages.research, StageRecord::default());
        assert_eq!(lead.stages.outreach.status, StageStatus::Completed);
        assert_eq!(lead.error_count, 3);

        StageReset::ALL_STAGES.apply_to_lead(&mut lead);
        assert_eq!(lead.stages.outreach.status, StageStatus::Pending);
        assert_eq!(lead.error_count, 0);
        assert!(lead.last_error.is_none());
    }

    #[test]
    fn test_retry_type_parsing() {
        for retry_type in RetryType::ALL {
            assert_eq!(retry_type.as_str().parse::<RetryType>().unwrap(), retry_type);
        }
        assert!("partial".parse::<RetryType>().is_err());
    }
}
