//! Proptest strategies for pipeline state.

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

use leadflow_core::models::{PipelineStages, StageStatus};

pub fn stage_status() -> impl Strategy<Value = StageStatus> {
    prop_oneof![
        Just(StageStatus::Pending),
        Just(StageStatus::InProgress),
        Just(StageStatus::Completed),
        Just(StageStatus::Failed),
    ]
}

pub fn pipeline_stages() -> impl Strategy<Value = PipelineStages> {
    (stage_status(), stage_status(), stage_status())
        .prop_map(|(research, outreach, db)| PipelineStages::from_statuses(research, outreach, db))
}

/// Error timestamps spread from three hours before `now` to five minutes after
pub fn error_times(now: DateTime<Utc>) -> impl Strategy<Value = Vec<DateTime<Utc>>> {
    prop::collection::vec(-180i64..5, 0..6).prop_map(move |offsets| {
        offsets
            .into_iter()
            .map(|minutes| now + Duration::minutes(minutes))
            .collect()
    })
}
