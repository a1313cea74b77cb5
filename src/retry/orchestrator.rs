//! Retry orchestration.
//!
//! A retry request is validated in full before anything is written. The
//! effects then run in a fixed order, each on its own:
//!
//! 1. clear `processed` on the lead rows
//! 2. reset stage columns on the lead rows per the retry policy
//! 3. upsert `lead_processing_status` (reset, `retry_count + 1`, `last_retry_at`)
//! 4. append one queued `retry_attempts` row per lead
//! 5. trigger the workflow engine webhook
//!
//! There is no transaction. A failing step is logged and reported in
//! [`RetryOutcome::step_failures`]; earlier steps are not rolled back and later
//! steps still run. Every step is safe to repeat.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::webhook::{WebhookPayload, WebhookResult, WorkflowTrigger};
use super::{RetryType, StageReset};
use crate::config::FromFailureMode;
use crate::constants;
use crate::error::{LeadflowError, LeadflowResult};
use crate::logging::{log_retry_operation, log_store_operation};
use crate::models::{Lead, LeadSource, NewRetryAttempt, RetryAttemptStatus, Stage};
use crate::status::{derive_status, errors_by_lead, recent_error_cutoff, OverallStatus};
use crate::store::LeadStore;
use crate::sync::SyncStatus;

/// Retry request as received from a caller, before validation
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRetryRequest {
    #[serde(default)]
    pub lead_ids: Vec<String>,
    #[serde(default)]
    pub source: String,
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub retry_type: String,
}

/// Validated retry request
#[derive(Debug, Clone, PartialEq)]
pub struct RetryRequest {
    /// Distinct ids in request order
    pub lead_ids: Vec<Uuid>,
    pub lead_source: LeadSource,
    pub workflow_name: String,
    pub retry_type: RetryType,
}

impl RetryRequest {
    pub fn new(
        lead_ids: Vec<Uuid>,
        lead_source: LeadSource,
        workflow_name: Option<String>,
        retry_type: RetryType,
    ) -> LeadflowResult<Self> {
        if lead_ids.is_empty() {
            return Err(LeadflowError::validation("leadIds must not be empty"));
        }

        let mut seen = HashSet::new();
        let lead_ids: Vec<Uuid> = lead_ids.into_iter().filter(|id| seen.insert(*id)).collect();

        let workflow_name = workflow_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_workflow_name(lead_source).to_string());

        Ok(Self {
            lead_ids,
            lead_source,
            workflow_name,
            retry_type,
        })
    }
}

impl TryFrom<RawRetryRequest> for RetryRequest {
    type Error = LeadflowError;

    fn try_from(raw: RawRetryRequest) -> LeadflowResult<Self> {
        if raw.lead_ids.is_empty() {
            return Err(LeadflowError::validation("leadIds must not be empty"));
        }

        let lead_source: LeadSource = raw.source.parse().map_err(LeadflowError::Validation)?;
        let retry_type: RetryType = raw.retry_type.parse().map_err(LeadflowError::Validation)?;

        let mut lead_ids = Vec::with_capacity(raw.lead_ids.len());
        let mut invalid = Vec::new();
        for raw_id in &raw.lead_ids {
            match Uuid::parse_str(raw_id.trim()) {
                Ok(id) => lead_ids.push(id),
                Err(_) => invalid.push(raw_id.as_str()),
            }
        }
        if !invalid.is_empty() {
            return Err(LeadflowError::Validation(format!(
                "Invalid lead ids: {}",
                invalid.join(", ")
            )));
        }

        Self::new(lead_ids, lead_source, raw.workflow_name, retry_type)
    }
}

/// Workflow retried when the request names none
pub fn default_workflow_name(lead_source: LeadSource) -> &'static str {
    match lead_source {
        LeadSource::Apollo => constants::retry::DEFAULT_APOLLO_WORKFLOW_NAME,
        LeadSource::Linkedin => constants::retry::DEFAULT_LINKEDIN_WORKFLOW_NAME,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStep {
    MarkUnprocessed,
    ResetStages,
    UpsertProcessingStatus,
    RecordAttempts,
}

impl RetryStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkUnprocessed => "mark_unprocessed",
            Self::ResetStages => "reset_stages",
            Self::UpsertProcessingStatus => "upsert_processing_status",
            Self::RecordAttempts => "record_attempts",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub step: RetryStep,
    /// Set when the step failed for one lead only
    pub lead_id: Option<Uuid>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcome {
    /// Number of leads queued for retry
    pub queued: usize,
    pub lead_ids: Vec<Uuid>,
    pub lead_source: LeadSource,
    pub retry_type: RetryType,
    pub workflow_name: String,
    pub webhook: WebhookResult,
    pub step_failures: Vec<StepFailure>,
    /// Leads already delivered to their platform
    pub already_synced: Vec<Uuid>,
    /// For `from_failure`: leads whose derived status was not `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_failed: Option<Vec<Uuid>>,
}

impl RetryOutcome {
    pub fn is_clean(&self) -> bool {
        self.step_failures.is_empty() && self.webhook.triggered
    }
}

#[derive(Debug, Clone)]
pub struct RetryOrchestrator {
    store: Arc<dyn LeadStore>,
    trigger: Arc<dyn WorkflowTrigger>,
    from_failure_mode: FromFailureMode,
}

impl RetryOrchestrator {
    pub fn new(
        store: Arc<dyn LeadStore>,
        trigger: Arc<dyn WorkflowTrigger>,
        from_failure_mode: FromFailureMode,
    ) -> Self {
        Self {
            store,
            trigger,
            from_failure_mode,
        }
    }

    pub fn from_failure_mode(&self) -> FromFailureMode {
        self.from_failure_mode
    }

    /// Validate and run one retry batch.
    ///
    /// Fails only on validation (including unknown ids, reported all at once)
    /// or when the pre-mutation reads fail. Once mutation starts, failures are
    /// reported in the outcome.
    pub async fn retry(&self, request: RetryRequest) -> LeadflowResult<RetryOutcome> {
        let RetryRequest {
            lead_ids,
            lead_source,
            workflow_name,
            retry_type,
        } = request;

        if lead_ids.is_empty() {
            return Err(LeadflowError::validation("leadIds must not be empty"));
        }

        let leads = self.store.find_leads(lead_source, &lead_ids).await?;
        let found: HashMap<Uuid, &Lead> = leads.iter().map(|lead| (lead.id, lead)).collect();
        let missing_ids: Vec<Uuid> = lead_ids
            .iter()
            .filter(|id| !found.contains_key(id))
            .copied()
            .collect();
        if !missing_ids.is_empty() {
            log_retry_operation(
                "validate",
                lead_source.as_str(),
                retry_type.as_str(),
                lead_ids.len(),
                "rejected",
                Some(&format!("{} lead(s) not found", missing_ids.len())),
            );
            return Err(LeadflowError::LeadsNotFound {
                lead_source,
                missing_ids,
            });
        }

        let failure_context = match retry_type {
            RetryType::FromFailure => Some(self.failure_context(lead_source, &lead_ids).await?),
            _ => None,
        };

        let resets: BTreeMap<Uuid, StageReset> = lead_ids
            .iter()
            .map(|id| {
                let failed_stage = failure_context
                    .as_ref()
                    .and_then(|context| context.failed_stages.get(id).copied());
                (*id, retry_type.stage_reset(self.from_failure_mode, failed_stage))
            })
            .collect();

        let already_synced: Vec<Uuid> = if retry_type.reruns_outreach() {
            lead_ids
                .iter()
                .filter(|id| {
                    found
                        .get(id)
                        .is_some_and(|lead| SyncStatus::for_lead(lead).overall_synced)
                })
                .copied()
                .collect()
        } else {
            Vec::new()
        };

        let step_failures = self
            .apply_effects(lead_source, &workflow_name, retry_type, &lead_ids, &resets)
            .await;

        let payload = WebhookPayload::retry(
            lead_ids.clone(),
            retry_type,
            lead_source,
            workflow_name.clone(),
            already_synced.clone(),
        );
        let webhook = self.trigger.trigger(&payload).await;

        let status = match (step_failures.is_empty(), webhook.triggered) {
            (true, true) => "queued",
            (true, false) => "queued_webhook_failed",
            (false, _) => "partial",
        };
        log_retry_operation(
            "retry",
            lead_source.as_str(),
            retry_type.as_str(),
            lead_ids.len(),
            status,
            webhook.reason.as_deref(),
        );

        Ok(RetryOutcome {
            queued: lead_ids.len(),
            lead_ids,
            lead_source,
            retry_type,
            workflow_name,
            webhook,
            step_failures,
            already_synced,
            not_failed: failure_context.map(|context| context.not_failed),
        })
    }

    /// Derived status of each lead, read before any mutation
    async fn failure_context(
        &self,
        lead_source: LeadSource,
        lead_ids: &[Uuid],
    ) -> LeadflowResult<FailureContext> {
        let now = Utc::now();
        let statuses = self.store.processing_statuses(lead_source, lead_ids).await?;
        let errors = self
            .store
            .lead_error_times_since(Some(lead_ids), recent_error_cutoff(now))
            .await?;
        let errors = errors_by_lead(&errors);

        let stages_by_id: HashMap<Uuid, _> = statuses
            .iter()
            .map(|status| (status.lead_id, &status.stages))
            .collect();

        let mut context = FailureContext::default();
        for id in lead_ids {
            let recent = errors.get(id).map(Vec::as_slice).unwrap_or_default();
            let derived = derive_status(stages_by_id.get(id).copied(), recent, now);
            if let Some(stage) = derived.failed_stage {
                context.failed_stages.insert(*id, stage);
            }
            if derived.status != OverallStatus::Failed {
                context.not_failed.push(*id);
            }
        }

        debug!(
            lead_count = lead_ids.len(),
            not_failed = context.not_failed.len(),
            "Derived failure context for from_failure retry"
        );
        Ok(context)
    }

    async fn apply_effects(
        &self,
        lead_source: LeadSource,
        workflow_name: &str,
        retry_type: RetryType,
        lead_ids: &[Uuid],
        resets: &BTreeMap<Uuid, StageReset>,
    ) -> Vec<StepFailure> {
        let mut failures = Vec::new();
        let now = Utc::now();

        if let Err(e) = self.store.mark_unprocessed(lead_source, lead_ids).await {
            failures.push(step_failure(RetryStep::MarkUnprocessed, None, &e));
        }

        let mut groups: BTreeMap<StageReset, Vec<Uuid>> = BTreeMap::new();
        for (id, reset) in resets {
            groups.entry(*reset).or_default().push(*id);
        }
        for (reset, ids) in &groups {
            if let Err(e) = self.store.reset_lead_stages(lead_source, ids, reset).await {
                failures.push(step_failure(RetryStep::ResetStages, None, &e));
            }
        }

        for id in lead_ids {
            let Some(reset) = resets.get(id) else {
                continue;
            };
            if let Err(e) = self
                .store
                .upsert_retry_status(lead_source, *id, reset, now)
                .await
            {
                failures.push(step_failure(RetryStep::UpsertProcessingStatus, Some(*id), &e));
            }
        }

        let attempts: Vec<NewRetryAttempt> = lead_ids
            .iter()
            .map(|id| NewRetryAttempt {
                lead_id: *id,
                lead_source,
                workflow_name: workflow_name.to_string(),
                retry_type,
                requested_at: now,
                status: RetryAttemptStatus::Queued,
            })
            .collect();
        match self.store.insert_retry_attempts(&attempts).await {
            Ok(inserted) => debug!(inserted, "Recorded retry attempts"),
            Err(e) => failures.push(step_failure(RetryStep::RecordAttempts, None, &e)),
        }

        if failures.is_empty() {
            info!(
                lead_source = %lead_source,
                retry_type = %retry_type,
                lead_count = lead_ids.len(),
                "Retry state reset"
            );
        }
        failures
    }
}

#[derive(Debug, Default)]
struct FailureContext {
    failed_stages: HashMap<Uuid, Stage>,
    not_failed: Vec<Uuid>,
}

fn step_failure(step: RetryStep, lead_id: Option<Uuid>, error: &LeadflowError) -> StepFailure {
    log_store_operation(step.as_str(), "retry", &error.to_string());
    StepFailure {
        step,
        lead_id,
        error: error.to_string(),
    }
}
