//! # Relational Store Access
//!
//! Every component reads and writes the shared store through [`LeadStore`].
//! A store is constructed once at startup and injected as `Arc<dyn LeadStore>`;
//! components never build their own clients.
//!
//! - [`PgLeadStore`]: PostgreSQL through a shared `sqlx::PgPool`
//! - [`InMemoryLeadStore`]: same semantics behind a lock, for tests and local runs
//!
//! Writes that the retry orchestrator issues are individually safe to repeat:
//! processing-status writes are upserts keyed on `(lead_id, lead_source)` and
//! increment `retry_count` inside the statement, never read-modify-write.

mod memory;
mod postgres;

pub use memory::InMemoryLeadStore;
pub use postgres::PgLeadStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::LeadflowResult;
use crate::models::{
    ApiUsage, Lead, LeadErrorTime, LeadListFilter, LeadProcessingStatus, LeadSource,
    LeadSyncFlags, NewRetryAttempt, WorkflowError, WorkflowExecution,
};
use crate::retry::StageReset;

#[async_trait]
pub trait LeadStore: Send + Sync + std::fmt::Debug {
    // ---------------------------------------------------------------------
    // Leads
    // ---------------------------------------------------------------------

    /// One page of leads, newest first, plus the total matching the filter
    async fn list_leads(&self, filter: &LeadListFilter) -> LeadflowResult<(Vec<Lead>, i64)>;

    async fn find_lead(&self, lead_source: LeadSource, id: Uuid) -> LeadflowResult<Option<Lead>>;

    /// Leads of `lead_source` among `ids`; ids that do not exist are simply absent
    async fn find_leads(&self, lead_source: LeadSource, ids: &[Uuid]) -> LeadflowResult<Vec<Lead>>;

    async fn count_leads(&self, lead_source: Option<LeadSource>) -> LeadflowResult<i64>;

    /// Sync columns of every lead whose lowercased email is in `emails`, in one round-trip
    async fn sync_flags_by_email(&self, emails: &[String]) -> LeadflowResult<Vec<LeadSyncFlags>>;

    /// Clear `processed` so the pipeline picks the leads up again; bumps the lead's `retry_count`
    async fn mark_unprocessed(&self, lead_source: LeadSource, ids: &[Uuid]) -> LeadflowResult<u64>;

    /// Reset stage columns (and error bookkeeping) on the lead rows
    async fn reset_lead_stages(
        &self,
        lead_source: LeadSource,
        ids: &[Uuid],
        reset: &StageReset,
    ) -> LeadflowResult<u64>;

    // ---------------------------------------------------------------------
    // Processing status
    // ---------------------------------------------------------------------

    async fn processing_statuses(
        &self,
        lead_source: LeadSource,
        ids: &[Uuid],
    ) -> LeadflowResult<Vec<LeadProcessingStatus>>;

    /// Status rows whose lead exists in its source table; orphaned rows are skipped
    async fn all_processing_statuses(&self) -> LeadflowResult<Vec<LeadProcessingStatus>>;

    /// Upsert the status row for a retry: apply `reset`, increment
    /// `retry_count` atomically and stamp `last_retry_at`.
    async fn upsert_retry_status(
        &self,
        lead_source: LeadSource,
        lead_id: Uuid,
        reset: &StageReset,
        retried_at: DateTime<Utc>,
    ) -> LeadflowResult<LeadProcessingStatus>;

    // ---------------------------------------------------------------------
    // Audit
    // ---------------------------------------------------------------------

    async fn insert_retry_attempts(&self, attempts: &[NewRetryAttempt]) -> LeadflowResult<u64>;

    // ---------------------------------------------------------------------
    // Errors, executions, usage
    // ---------------------------------------------------------------------

    /// Occurrence times of lead-linked errors since `since`, optionally limited to `lead_ids`
    async fn lead_error_times_since(
        &self,
        lead_ids: Option<&[Uuid]>,
        since: DateTime<Utc>,
    ) -> LeadflowResult<Vec<LeadErrorTime>>;

    async fn lead_errors(&self, lead_id: Uuid, limit: i64) -> LeadflowResult<Vec<WorkflowError>>;

    async fn errors_since(&self, since: DateTime<Utc>) -> LeadflowResult<Vec<WorkflowError>>;

    async fn recent_errors(&self, limit: i64) -> LeadflowResult<Vec<WorkflowError>>;

    async fn executions_since(&self, since: DateTime<Utc>)
        -> LeadflowResult<Vec<WorkflowExecution>>;

    async fn recent_executions(&self, limit: i64) -> LeadflowResult<Vec<WorkflowExecution>>;

    async fn api_usage_since(&self, since: DateTime<Utc>) -> LeadflowResult<Vec<ApiUsage>>;
}

/// Lowercase and trim emails for matching against stored rows
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
