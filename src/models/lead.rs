use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Upstream channel that produced a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Apollo,
    Linkedin,
}

impl LeadSource {
    pub const ALL: [LeadSource; 2] = [LeadSource::Apollo, LeadSource::Linkedin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apollo => "apollo",
            Self::Linkedin => "linkedin",
        }
    }

    /// The only delivery platform a lead from this source is ever synced through
    pub fn delivery_platform(&self) -> DeliveryPlatform {
        match self {
            Self::Apollo => DeliveryPlatform::Instantly,
            Self::Linkedin => DeliveryPlatform::Heyreach,
        }
    }
}

impl fmt::Display for LeadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apollo" => Ok(Self::Apollo),
            "linkedin" => Ok(Self::Linkedin),
            _ => Err(format!("Invalid lead source: {s}")),
        }
    }
}

/// External outreach platform that receives synced leads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPlatform {
    /// Email sequencing platform (apollo leads)
    Instantly,
    /// LinkedIn outreach platform (linkedin leads)
    Heyreach,
}

impl fmt::Display for DeliveryPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instantly => write!(f, "instantly"),
            Self::Heyreach => write!(f, "heyreach"),
        }
    }
}

/// Pipeline phase tracked per lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    Outreach,
    DatabaseUpdate,
}

impl Stage {
    /// Stages in execution order
    pub const PIPELINE_ORDER: [Stage; 3] = [Stage::Research, Stage::Outreach, Stage::DatabaseUpdate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Outreach => "outreach",
            Self::DatabaseUpdate => "database_update",
        }
    }

    /// Position in [`Stage::PIPELINE_ORDER`]
    pub fn position(&self) -> usize {
        match self {
            Self::Research => 0,
            Self::Outreach => 1,
            Self::DatabaseUpdate => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage status stored on lead and processing-status rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored column value; absent values are `pending`.
    pub fn from_column(value: Option<&str>) -> Self {
        match value {
            None => Self::Pending,
            Some(raw) => raw.parse().unwrap_or_else(|err: String| {
                tracing::warn!(value = raw, error = %err, "Unknown stage status, treating as pending");
                Self::Pending
            }),
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" | "processing" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid stage status: {s}")),
        }
    }
}

/// Status, timing and error of one stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl StageRecord {
    pub fn with_status(status: StageStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Back to `pending` with no timing or error
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The three stage records of a lead
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStages {
    pub research: StageRecord,
    pub outreach: StageRecord,
    pub database_update: StageRecord,
}

impl PipelineStages {
    pub fn from_statuses(
        research: StageStatus,
        outreach: StageStatus,
        database_update: StageStatus,
    ) -> Self {
        Self {
            research: StageRecord::with_status(research),
            outreach: StageRecord::with_status(outreach),
            database_update: StageRecord::with_status(database_update),
        }
    }

    pub fn get(&self, stage: Stage) -> &StageRecord {
        match stage {
            Stage::Research => &self.research,
            Stage::Outreach => &self.outreach,
            Stage::DatabaseUpdate => &self.database_update,
        }
    }

    pub fn get_mut(&mut self, stage: Stage) -> &mut StageRecord {
        match stage {
            Stage::Research => &mut self.research,
            Stage::Outreach => &mut self.outreach,
            Stage::DatabaseUpdate => &mut self.database_update,
        }
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.get(stage).status
    }
}

/// One prospect produced by a lead source.
/// Maps to `apollo_leads` / `linkedin_leads` depending on `lead_source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub lead_source: LeadSource,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub niche: Option<String>,
    pub tags: BTreeSet<String>,
    pub stages: PipelineStages,
    /// Cleared by retries so the pipeline picks the lead up again
    pub processed: bool,
    pub error_count: i32,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub last_error_node: Option<String>,
    pub instantly_synced: bool,
    pub instantly_synced_at: Option<DateTime<Utc>>,
    pub heyreach_synced: bool,
    pub heyreach_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// A fresh, unprocessed lead with no stage progress
    pub fn new(lead_source: LeadSource, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_source,
            full_name: None,
            email: Some(email.into()),
            company: None,
            title: None,
            niche: None,
            tags: BTreeSet::new(),
            stages: PipelineStages::default(),
            processed: false,
            error_count: 0,
            retry_count: 0,
            last_error: None,
            last_error_node: None,
            instantly_synced: false,
            instantly_synced_at: None,
            heyreach_synced: false,
            heyreach_synced_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn sync_flags(&self) -> Option<LeadSyncFlags> {
        self.email.as_ref().map(|email| LeadSyncFlags {
            email: email.clone(),
            lead_id: self.id,
            lead_source: self.lead_source,
            instantly_synced: self.instantly_synced,
            instantly_synced_at: self.instantly_synced_at,
            heyreach_synced: self.heyreach_synced,
            heyreach_synced_at: self.heyreach_synced_at,
        })
    }
}

/// Cached delivery-platform sync columns of one lead row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSyncFlags {
    pub email: String,
    pub lead_id: Uuid,
    pub lead_source: LeadSource,
    pub instantly_synced: bool,
    pub instantly_synced_at: Option<DateTime<Utc>>,
    pub heyreach_synced: bool,
    pub heyreach_synced_at: Option<DateTime<Utc>>,
}

/// Filter for paged lead listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadListFilter {
    pub lead_source: Option<LeadSource>,
    pub limit: i64,
    pub offset: i64,
}
