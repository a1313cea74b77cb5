use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Started,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Terminal runs are never re-opened
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" | "running" => Ok(Self::Started),
            "completed" | "success" => Ok(Self::Completed),
            "failed" | "error" => Ok(Self::Failed),
            _ => Err(format!("Invalid execution status: {s}")),
        }
    }
}

/// One pipeline run. Maps to `workflow_executions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_name: String,
    pub campaign_name: Option<String>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub leads_processed: i32,
}

impl WorkflowExecution {
    /// Wall-clock duration of a finished run
    pub fn duration_seconds(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds() as f64 / 1000.0)
            .filter(|secs| *secs >= 0.0)
    }
}
