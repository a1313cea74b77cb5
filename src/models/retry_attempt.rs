use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::lead::LeadSource;
use crate::retry::RetryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAttemptStatus {
    /// Written by the retry orchestrator
    Queued,
    /// Written back by the workflow engine
    Processing,
    Completed,
    Failed,
}

impl RetryAttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RetryAttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RetryAttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid retry attempt status: {s}")),
        }
    }
}

/// Audit entry of a requested retry. Maps to `retry_attempts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub lead_source: LeadSource,
    pub workflow_name: String,
    pub retry_type: RetryType,
    pub requested_at: DateTime<Utc>,
    pub status: RetryAttemptStatus,
}

/// New RetryAttempt for creation (without generated fields)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRetryAttempt {
    pub lead_id: Uuid,
    pub lead_source: LeadSource,
    pub workflow_name: String,
    pub retry_type: RetryType,
    pub requested_at: DateTime<Utc>,
    pub status: RetryAttemptStatus,
}

impl NewRetryAttempt {
    pub fn into_attempt(self, id: Uuid) -> RetryAttempt {
        RetryAttempt {
            id,
            lead_id: self.lead_id,
            lead_source: self.lead_source,
            workflow_name: self.workflow_name,
            retry_type: self.retry_type,
            requested_at: self.requested_at,
            status: self.status,
        }
    }
}
