use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lead::{LeadSource, PipelineStages};

/// Per-lead stage state read by status derivation.
/// Maps to `lead_processing_status`, unique on `(lead_id, lead_source)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadProcessingStatus {
    pub lead_id: Uuid,
    pub lead_source: LeadSource,
    pub stages: PipelineStages,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl LeadProcessingStatus {
    pub fn new(lead_id: Uuid, lead_source: LeadSource, stages: PipelineStages) -> Self {
        Self {
            lead_id,
            lead_source,
            stages,
            retry_count: 0,
            last_retry_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Store key of this row
    pub fn key(&self) -> (Uuid, LeadSource) {
        (self.lead_id, self.lead_source)
    }
}
