//! In-memory [`LeadStore`] with the same semantics as the PostgreSQL store.
//!
//! Besides backing tests and local runs, it can be told to fail named
//! operations so callers' degradation paths can be exercised.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{normalize_email, LeadStore};
use crate::error::{LeadflowError, LeadflowResult};
use crate::models::{
    ApiUsage, Lead, LeadErrorTime, LeadListFilter, LeadProcessingStatus, LeadSource,
    LeadSyncFlags, NewRetryAttempt, RetryAttempt, WorkflowError,
    WorkflowExecution,
};
use crate::retry::StageReset;

#[derive(Debug, Default)]
struct Tables {
    leads: HashMap<(LeadSource, Uuid), Lead>,
    statuses: HashMap<(Uuid, LeadSource), LeadProcessingStatus>,
    executions: Vec<WorkflowExecution>,
    errors: Vec<WorkflowError>,
    retry_attempts: Vec<RetryAttempt>,
    api_usage: Vec<ApiUsage>,
}

#[derive(Debug, Default)]
pub struct InMemoryLeadStore {
    tables: RwLock<Tables>,
    failing: RwLock<HashSet<String>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    pub fn insert_lead(&self, lead: Lead) {
        self.tables
            .write()
            .leads
            .insert((lead.lead_source, lead.id), lead);
    }

    pub fn insert_processing_status(&self, status: LeadProcessingStatus) {
        self.tables.write().statuses.insert(status.key(), status);
    }

    pub fn insert_execution(&self, execution: WorkflowExecution) {
        self.tables.write().executions.push(execution);
    }

    pub fn insert_error(&self, error: WorkflowError) {
        self.tables.write().errors.push(error);
    }

    pub fn insert_api_usage(&self, usage: ApiUsage) {
        self.tables.write().api_usage.push(usage);
    }

    pub fn lead(&self, lead_source: LeadSource, id: Uuid) -> Option<Lead> {
        self.tables.read().leads.get(&(lead_source, id)).cloned()
    }

    pub fn processing_status(&self, lead_source: LeadSource, id: Uuid) -> Option<LeadProcessingStatus> {
        self.tables.read().statuses.get(&(id, lead_source)).cloned()
    }

    pub fn retry_attempts(&self) -> Vec<RetryAttempt> {
        self.tables.read().retry_attempts.clone()
    }

    /// Make every call of the named trait method fail with a database error
    pub fn fail_operation(&self, operation: &str) {
        self.failing.write().insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    fn check(&self, operation: &str) -> LeadflowResult<()> {
        if self.failing.read().contains(operation) {
            return Err(LeadflowError::Database(format!(
                "injected failure in {operation}"
            )));
        }
        Ok(())
    }
}

fn newest_first<T, F>(mut rows: Vec<T>, key: F, limit: i64) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    rows.sort_by_key(|row| std::cmp::Reverse(key(row)));
    rows.truncate(limit.max(0) as usize);
    rows
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn list_leads(&self, filter: &LeadListFilter) -> LeadflowResult<(Vec<Lead>, i64)> {
        self.check("list_leads")?;
        let tables = self.tables.read();
        let mut leads: Vec<Lead> = tables
            .leads
            .values()
            .filter(|lead| filter.lead_source.is_none_or(|source| lead.lead_source == source))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = leads.len() as i64;
        let page = leads
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn find_lead(&self, lead_source: LeadSource, id: Uuid) -> LeadflowResult<Option<Lead>> {
        self.check("find_lead")?;
        Ok(self.lead(lead_source, id))
    }

    async fn find_leads(&self, lead_source: LeadSource, ids: &[Uuid]) -> LeadflowResult<Vec<Lead>> {
        self.check("find_leads")?;
        let tables = self.tables.read();
        Ok(ids
            .iter()
            .filter_map(|id| tables.leads.get(&(lead_source, *id)).cloned())
            .collect())
    }

    async fn count_leads(&self, lead_source: Option<LeadSource>) -> LeadflowResult<i64> {
        self.check("count_leads")?;
        let tables = self.tables.read();
        Ok(tables
            .leads
            .keys()
            .filter(|(source, _)| lead_source.is_none_or(|wanted| *source == wanted))
            .count() as i64)
    }

    async fn sync_flags_by_email(&self, emails: &[String]) -> LeadflowResult<Vec<LeadSyncFlags>> {
        self.check("sync_flags_by_email")?;
        let wanted: HashSet<String> = emails.iter().map(|e| normalize_email(e)).collect();
        let tables = self.tables.read();
        Ok(tables
            .leads
            .values()
            .filter(|lead| {
                lead.email
                    .as_deref()
                    .is_some_and(|email| wanted.contains(&normalize_email(email)))
            })
            .filter_map(Lead::sync_flags)
            .collect())
    }

    async fn mark_unprocessed(&self, lead_source: LeadSource, ids: &[Uuid]) -> LeadflowResult<u64> {
        self.check("mark_unprocessed")?;
        let mut tables = self.tables.write();
        let mut updated = 0;
        for id in ids {
            if let Some(lead) = tables.leads.get_mut(&(lead_source, *id)) {
                lead.processed = false;
                lead.retry_count += 1;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn reset_lead_stages(
        &self,
        lead_source: LeadSource,
        ids: &[Uuid],
        reset: &StageReset,
    ) -> LeadflowResult<u64> {
        self.check("reset_lead_stages")?;
        let mut tables = self.tables.write();
        let mut updated = 0;
        for id in ids {
            if let Some(lead) = tables.leads.get_mut(&(lead_source, *id)) {
                reset.apply_to_lead(lead);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn processing_statuses(
        &self,
        lead_source: LeadSource,
        ids: &[Uuid],
    ) -> LeadflowResult<Vec<LeadProcessingStatus>> {
        self.check("processing_statuses")?;
        let tables = self.tables.read();
        Ok(ids
            .iter()
            .filter_map(|id| tables.statuses.get(&(*id, lead_source)).cloned())
            .collect())
    }

    async fn all_processing_statuses(&self) -> LeadflowResult<Vec<LeadProcessingStatus>> {
        self.check("all_processing_statuses")?;
        let tables = self.tables.read();
        Ok(tables
            .statuses
            .values()
            .filter(|row| tables.leads.contains_key(&(row.lead_source, row.lead_id)))
            .cloned()
            .collect())
    }

    async fn upsert_retry_status(
        &self,
        lead_source: LeadSource,
        lead_id: Uuid,
        reset: &StageReset,
        retried_at: DateTime<Utc>,
    ) -> LeadflowResult<LeadProcessingStatus> {
        self.check("upsert_retry_status")?;
        let mut tables = self.tables.write();
        let key = (lead_id, lead_source);
        // A new row starts from the lead's own stage columns
        let seed = if tables.statuses.contains_key(&key) {
            None
        } else {
            let lead = tables.leads.get(&(lead_source, lead_id)).ok_or_else(|| {
                LeadflowError::Database(format!("no {lead_source} lead with id {lead_id}"))
            })?;
            Some(lead.stages.clone())
        };
        let row = tables.statuses.entry(key).or_insert_with(|| {
            LeadProcessingStatus::new(lead_id, lead_source, seed.unwrap_or_default())
        });
        reset.apply_to_stages(&mut row.stages);
        row.retry_count += 1;
        row.last_retry_at = Some(retried_at);
        row.updated_at = retried_at;
        Ok(row.clone())
    }

    async fn insert_retry_attempts(&self, attempts: &[NewRetryAttempt]) -> LeadflowResult<u64> {
        self.check("insert_retry_attempts")?;
        let mut tables = self.tables.write();
        for attempt in attempts {
            tables
                .retry_attempts
                .push(attempt.clone().into_attempt(Uuid::new_v4()));
        }
        Ok(attempts.len() as u64)
    }

    async fn lead_error_times_since(
        &self,
        lead_ids: Option<&[Uuid]>,
        since: DateTime<Utc>,
    ) -> LeadflowResult<Vec<LeadErrorTime>> {
        self.check("lead_error_times_since")?;
        let wanted: Option<HashSet<Uuid>> = lead_ids.map(|ids| ids.iter().copied().collect());
        let tables = self.tables.read();
        Ok(tables
            .errors
            .iter()
            .filter(|error| error.occurred_at >= since)
            .filter_map(|error| {
                let lead_id = error.lead_id?;
                let included = wanted.as_ref().is_none_or(|ids| ids.contains(&lead_id));
                included.then_some(LeadErrorTime {
                    lead_id,
                    occurred_at: error.occurred_at,
                })
            })
            .collect())
    }

    async fn lead_errors(&self, lead_id: Uuid, limit: i64) -> LeadflowResult<Vec<WorkflowError>> {
        self.check("lead_errors")?;
        let rows = self
            .tables
            .read()
            .errors
            .iter()
            .filter(|error| error.lead_id == Some(lead_id))
            .cloned()
            .collect();
        Ok(newest_first(rows, |e: &WorkflowError| e.occurred_at, limit))
    }

    async fn errors_since(&self, since: DateTime<Utc>) -> LeadflowResult<Vec<WorkflowError>> {
        self.check("errors_since")?;
        let mut rows: Vec<WorkflowError> = self
            .tables
            .read()
            .errors
            .iter()
            .filter(|error| error.occurred_at >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|error| error.occurred_at);
        Ok(rows)
    }

    async fn recent_errors(&self, limit: i64) -> LeadflowResult<Vec<WorkflowError>> {
        self.check("recent_errors")?;
        let rows = self.tables.read().errors.clone();
        Ok(newest_first(rows, |e: &WorkflowError| e.occurred_at, limit))
    }

    async fn executions_since(
        &self,
        since: DateTime<Utc>,
    ) -> LeadflowResult<Vec<WorkflowExecution>> {
        self.check("executions_since")?;
        let mut rows: Vec<WorkflowExecution> = self
            .tables
            .read()
            .executions
            .iter()
            .filter(|execution| execution.started_at >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|execution| execution.started_at);
        Ok(rows)
    }

    async fn recent_executions(&self, limit: i64) -> LeadflowResult<Vec<WorkflowExecution>> {
        self.check("recent_executions")?;
        let rows = self.tables.read().executions.clone();
        Ok(newest_first(rows, |e: &WorkflowExecution| e.started_at, limit))
    }

    async fn api_usage_since(&self, since: DateTime<Utc>) -> LeadflowResult<Vec<ApiUsage>> {
        self.check("api_usage_since")?;
        let mut rows: Vec<ApiUsage> = self
            .tables
            .read()
            .api_usage
            .iter()
            .filter(|usage| usage.called_at >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|usage| usage.called_at);
        Ok(rows)
    }
}
