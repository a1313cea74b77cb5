//! # PostgreSQL Lead Store
//!
//! [`LeadStore`] over a shared `sqlx::PgPool`. Queries are built at runtime
//! with `sqlx::query_as` and read into private row structs whose text columns
//! are parsed into the domain enums.
//!
//! ## Tables
//!
//! ```sql
//! -- apollo_leads and linkedin_leads share one column layout
//! CREATE TABLE apollo_leads (
//!   id UUID PRIMARY KEY,
//!   full_name TEXT, email TEXT, company TEXT, title TEXT, niche TEXT, tags TEXT[],
//!   research_status TEXT, research_started_at TIMESTAMPTZ,
//!   research_completed_at TIMESTAMPTZ, research_error TEXT,
//!   outreach_status TEXT, ...            -- same four columns per stage
//!   database_update_status TEXT, ...
//!   processed BOOLEAN NOT NULL DEFAULT false,
//!   error_count INT NOT NULL DEFAULT 0, retry_count INT NOT NULL DEFAULT 0,
//!   last_error TEXT, last_error_node TEXT,
//!   instantly_synced BOOLEAN, instantly_synced_at TIMESTAMPTZ,
//!   heyreach_synced BOOLEAN, heyreach_synced_at TIMESTAMPTZ,
//!   created_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//!
//! CREATE TABLE lead_processing_status (
//!   lead_id UUID NOT NULL, lead_source TEXT NOT NULL,
//!   research_status TEXT, ...            -- same stage columns as the lead tables
//!   retry_count INT NOT NULL DEFAULT 0, last_retry_at TIMESTAMPTZ,
//!   updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!   UNIQUE (lead_id, lead_source)
//! );
//! ```
//!
//! `workflow_executions`, `workflow_errors`, `retry_attempts` and `api_usage`
//! follow the fields of their model types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{normalize_email, LeadStore};
use crate::config::DatabaseConfig;
use crate::error::{LeadflowError, LeadflowResult};
use crate::models::{
    ApiUsage, Lead, LeadErrorTime, LeadListFilter, LeadProcessingStatus, LeadSource,
    LeadSyncFlags, NewRetryAttempt, PipelineStages, StageRecord, StageStatus, WorkflowError,
    WorkflowExecution,
};
use crate::retry::StageReset;

const LEAD_COLUMNS: &str = r#"
    id, full_name, email, company, title, niche, tags,
    research_status, research_started_at, research_completed_at, research_error,
    outreach_status, outreach_started_at, outreach_completed_at, outreach_error,
    database_update_status, database_update_started_at, database_update_completed_at,
    database_update_error,
    processed, error_count, retry_count, last_error, last_error_node,
    COALESCE(instantly_synced, false) AS instantly_synced, instantly_synced_at,
    COALESCE(heyreach_synced, false) AS heyreach_synced, heyreach_synced_at,
    created_at
"#;

const STATUS_COLUMNS: &str = r#"
    lead_id, lead_source,
    research_status, research_started_at, research_completed_at, research_error,
    outreach_status, outreach_started_at, outreach_completed_at, outreach_error,
    database_update_status, database_update_started_at, database_update_completed_at,
    database_update_error,
    retry_count, last_retry_at, updated_at
"#;

const ERROR_COLUMNS: &str = r#"
    id, workflow_name, node_name, error_type, error_message, severity,
    occurred_at, lead_id, lead_source
"#;

const EXECUTION_COLUMNS: &str = r#"
    id, workflow_name, campaign_name, status, started_at, completed_at,
    COALESCE(leads_processed, 0) AS leads_processed
"#;

/// Table holding the leads of `lead_source`
pub(crate) fn lead_table(lead_source: LeadSource) -> &'static str {
    match lead_source {
        LeadSource::Apollo => "apollo_leads",
        LeadSource::Linkedin => "linkedin_leads",
    }
}

fn select_leads(lead_source: LeadSource) -> String {
    format!(
        "SELECT '{}'::text AS lead_source, {LEAD_COLUMNS} FROM {}",
        lead_source.as_str(),
        lead_table(lead_source)
    )
}

fn parse_column<T>(value: &str) -> LeadflowResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(LeadflowError::Database)
}

fn stage_record(
    status: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
) -> StageRecord {
    StageRecord {
        status: StageStatus::from_column(status.as_deref()),
        started_at,
        completed_at,
        error,
    }
}

#[derive(Debug, FromRow)]
struct StageColumns {
    research_status: Option<String>,
    research_started_at: Option<DateTime<Utc>>,
    research_completed_at: Option<DateTime<Utc>>,
    research_error: Option<String>,
    outreach_status: Option<String>,
    outreach_started_at: Option<DateTime<Utc>>,
    outreach_completed_at: Option<DateTime<Utc>>,
    outreach_error: Option<String>,
    database_update_status: Option<String>,
    database_update_started_at: Option<DateTime<Utc>>,
    database_update_completed_at: Option<DateTime<Utc>>,
    database_update_error: Option<String>,
}

impl From<StageColumns> for PipelineStages {
    fn from(row: StageColumns) -> Self {
        PipelineStages {
            research: stage_record(
                row.research_status,
                row.research_started_at,
                row.research_completed_at,
                row.research_error,
            ),
            outreach: stage_record(
                row.outreach_status,
                row.outreach_started_at,
                row.outreach_completed_at,
                row.outreach_error,
            ),
            database_update: stage_record(
                row.database_update_status,
                row.database_update_started_at,
                row.database_update_completed_at,
                row.database_update_error,
            ),
        }
    }
}

#[derive(Debug, FromRow)]
struct LeadRow {
    lead_source: String,
    id: Uuid,
    full_name: Option<String>,
    email: Option<String>,
    company: Option<String>,
    title: Option<String>,
    niche: Option<String>,
    tags: Option<Vec<String>>,
    #[sqlx(flatten)]
    stages: StageColumns,
    processed: bool,
    error_count: i32,
    retry_count: i32,
    last_error: Option<String>,
    last_error_node: Option<String>,
    instantly_synced: bool,
    instantly_synced_at: Option<DateTime<Utc>>,
    heyreach_synced: bool,
    heyreach_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for Lead {
    type Error = LeadflowError;

    fn try_from(row: LeadRow) -> LeadflowResult<Self> {
        Ok(Lead {
            id: row.id,
            lead_source: parse_column(&row.lead_source)?,
            full_name: row.full_name,
            email: row.email,
            company: row.company,
            title: row.title,
            niche: row.niche,
            tags: row.tags.unwrap_or_default().into_iter().collect::<BTreeSet<_>>(),
            stages: row.stages.into(),
            processed: row.processed,
            error_count: row.error_count,
            retry_count: row.retry_count,
            last_error: row.last_error,
            last_error_node: row.last_error_node,
            instantly_synced: row.instantly_synced,
            instantly_synced_at: row.instantly_synced_at,
            heyreach_synced: row.heyreach_synced,
            heyreach_synced_at: row.heyreach_synced_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct StatusRow {
    lead_id: Uuid,
    lead_source: String,
    #[sqlx(flatten)]
    stages: StageColumns,
    retry_count: i32,
    last_retry_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StatusRow> for LeadProcessingStatus {
    type Error = LeadflowError;

    fn try_from(row: StatusRow) -> LeadflowResult<Self> {
        Ok(LeadProcessingStatus {
            lead_id: row.lead_id,
            lead_source: parse_column(&row.lead_source)?,
            stages: row.stages.into(),
            retry_count: row.retry_count,
            last_retry_at: row.last_retry_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SyncRow {
    email: String,
    lead_id: Uuid,
    lead_source: String,
    instantly_synced: bool,
    instantly_synced_at: Option<DateTime<Utc>>,
    heyreach_synced: bool,
    heyreach_synced_at: Option<DateTime<Utc>>,
}

impl TryFrom<SyncRow> for LeadSyncFlags {
    type Error = LeadflowError;

    fn try_from(row: SyncRow) -> LeadflowResult<Self> {
        Ok(LeadSyncFlags {
            email: row.email,
            lead_id: row.lead_id,
            lead_source: parse_column(&row.lead_source)?,
            instantly_synced: row.instantly_synced,
            instantly_synced_at: row.instantly_synced_at,
            heyreach_synced: row.heyreach_synced,
            heyreach_synced_at: row.heyreach_synced_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ErrorRow {
    id: Uuid,
    workflow_name: String,
    node_name: Option<String>,
    error_type: String,
    error_message: Option<String>,
    severity: String,
    occurred_at: DateTime<Utc>,
    lead_id: Option<Uuid>,
    lead_source: Option<String>,
}

impl TryFrom<ErrorRow> for WorkflowError {
    type Error = LeadflowError;

    fn try_from(row: ErrorRow) -> LeadflowResult<Self> {
        Ok(WorkflowError {
            id: row.id,
            workflow_name: row.workflow_name,
            node_name: row.node_name,
            error_type: row.error_type,
            error_message: row.error_message,
            severity: parse_column(&row.severity)?,
            occurred_at: row.occurred_at,
            lead_id: row.lead_id,
            lead_source: row.lead_source.as_deref().map(parse_column).transpose()?,
        })
    }
}

#[derive(Debug, FromRow)]
struct ExecutionRow {
    id: Uuid,
    workflow_name: String,
    campaign_name: Option<String>,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    leads_processed: i32,
}

impl TryFrom<ExecutionRow> for WorkflowExecution {
    type Error = LeadflowError;

    fn try_from(row: ExecutionRow) -> LeadflowResult<Self> {
        Ok(WorkflowExecution {
            id: row.id,
            workflow_name: row.workflow_name,
            campaign_name: row.campaign_name,
            status: parse_column(&row.status)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            leads_processed: row.leads_processed,
        })
    }
}

#[derive(Debug, FromRow)]
struct ApiUsageRow {
    id: Uuid,
    model_name: String,
    api_service: String,
    workflow_name: Option<String>,
    input_tokens: i64,
    output_tokens: i64,
    total_tokens: i64,
    total_cost: f64,
    called_at: DateTime<Utc>,
}

impl From<ApiUsageRow> for ApiUsage {
    fn from(row: ApiUsageRow) -> Self {
        ApiUsage {
            id: row.id,
            model_name: row.model_name,
            api_service: row.api_service,
            workflow_name: row.workflow_name,
            input_tokens: row.input_tokens,
            output_tokens: row.output_tokens,
            total_tokens: row.total_tokens,
            total_cost: row.total_cost,
            called_at: row.called_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ErrorTimeRow {
    lead_id: Uuid,
    occurred_at: DateTime<Utc>,
}

fn convert_all<R, T>(rows: Vec<R>) -> LeadflowResult<Vec<T>>
where
    T: TryFrom<R, Error = LeadflowError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// PostgreSQL-backed store sharing one connection pool across components
#[derive(Clone)]
pub struct PgLeadStore {
    pool: PgPool,
}

impl std::fmt::Debug for PgLeadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgLeadStore")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open the shared pool described by `config`
    pub async fn connect(config: &DatabaseConfig) -> LeadflowResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_seconds)))
            .connect(&config.url)
            .await
            .map_err(|e| LeadflowError::Database(format!("Failed to connect to database: {e}")))?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Database pool initialized"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn list_leads(&self, filter: &LeadListFilter) -> LeadflowResult<(Vec<Lead>, i64)> {
        let sources: Vec<LeadSource> = match filter.lead_source {
            Some(source) => vec![source],
            None => LeadSource::ALL.to_vec(),
        };
        let union = sources
            .iter()
            .map(|source| select_leads(*source))
            .collect::<Vec<_>>()
            .join(" UNION ALL ");

        let rows = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT * FROM ({union}) leads ORDER BY created_at DESC, id LIMIT $1 OFFSET $2"
        ))
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let total = self.count_leads(filter.lead_source).await?;
        debug!(returned = rows.len(), total, "Listed leads");
        Ok((convert_all(rows)?, total))
    }

    async fn find_lead(&self, lead_source: LeadSource, id: Uuid) -> LeadflowResult<Option<Lead>> {
        let row = sqlx::query_as::<_, LeadRow>(&format!(
            "{} WHERE id = $1",
            select_leads(lead_source)
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Lead::try_from).transpose()
    }

    async fn find_leads(&self, lead_source: LeadSource, ids: &[Uuid]) -> LeadflowResult<Vec<Lead>> {
        let rows = sqlx::query_as::<_, LeadRow>(&format!(
            "{} WHERE id = ANY($1)",
            select_leads(lead_source)
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn count_leads(&self, lead_source: Option<LeadSource>) -> LeadflowResult<i64> {
        let query = match lead_source {
            Some(source) => format!("SELECT COUNT(*) FROM {}", lead_table(source)),
            None => format!(
                "SELECT (SELECT COUNT(*) FROM {}) + (SELECT COUNT(*) FROM {})",
                lead_table(LeadSource::Apollo),
                lead_table(LeadSource::Linkedin)
            ),
        };
        let count: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn sync_flags_by_email(&self, emails: &[String]) -> LeadflowResult<Vec<LeadSyncFlags>> {
        let normalized: Vec<String> = emails.iter().map(|e| normalize_email(e)).collect();
        let union = LeadSource::ALL
            .iter()
            .map(|source| {
                format!(
                    r#"SELECT email, id AS lead_id, '{}'::text AS lead_source,
                        COALESCE(instantly_synced, false) AS instantly_synced, instantly_synced_at,
                        COALESCE(heyreach_synced, false) AS heyreach_synced, heyreach_synced_at
                    FROM {} WHERE email IS NOT NULL AND lower(email) = ANY($1)"#,
                    source.as_str(),
                    lead_table(*source)
                )
            })
            .collect::<Vec<_>>()
            .join(" UNION ALL ");

        let rows = sqlx::query_as::<_, SyncRow>(&union)
            .bind(&normalized)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn mark_unprocessed(&self, lead_source: LeadSource, ids: &[Uuid]) -> LeadflowResult<u64> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET processed = false, retry_count = retry_count + 1 WHERE id = ANY($1)",
            lead_table(lead_source)
        ))
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn reset_lead_stages(
        &self,
        lead_source: LeadSource,
        ids: &[Uuid],
        reset: &StageReset,
    ) -> LeadflowResult<u64> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET {},
                last_error = CASE WHEN $5 THEN NULL ELSE last_error END,
                last_error_node = CASE WHEN $5 THEN NULL ELSE last_error_node END,
                error_count = CASE WHEN $5 THEN 0 ELSE error_count END
            WHERE id = ANY($1)
            "#,
            lead_table(lead_source),
            stage_reset_assignments("", 2)
        ))
        .bind(ids)
        .bind(reset.research)
        .bind(reset.outreach)
        .bind(reset.database_update)
        .bind(reset.clear_errors)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn processing_statuses(
        &self,
        lead_source: LeadSource,
        ids: &[Uuid],
    ) -> LeadflowResult<Vec<LeadProcessingStatus>> {
        let rows = sqlx::query_as::<_, StatusRow>(&format!(
            "SELECT {STATUS_COLUMNS} FROM lead_processing_status WHERE lead_source = $1 AND lead_id = ANY($2)"
        ))
        .bind(lead_source.as_str())
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn all_processing_statuses(&self) -> LeadflowResult<Vec<LeadProcessingStatus>> {
        let rows = sqlx::query_as::<_, StatusRow>(&format!(
            r#"
            SELECT {STATUS_COLUMNS} FROM lead_processing_status status
            WHERE (status.lead_source = 'apollo'
                   AND EXISTS (SELECT 1 FROM {} lead WHERE lead.id = status.lead_id))
               OR (status.lead_source = 'linkedin'
                   AND EXISTS (SELECT 1 FROM {} lead WHERE lead.id = status.lead_id))
            "#,
            lead_table(LeadSource::Apollo),
            lead_table(LeadSource::Linkedin)
        ))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn upsert_retry_status(
        &self,
        lead_source: LeadSource,
        lead_id: Uuid,
        reset: &StageReset,
        retried_at: DateTime<Utc>,
    ) -> LeadflowResult<LeadProcessingStatus> {
        // A new row starts from the lead's own stage columns with the reset applied
        let row = sqlx::query_as::<_, StatusRow>(&format!(
            r#"
            INSERT INTO lead_processing_status (
                lead_id, lead_source,
                research_status, research_started_at, research_completed_at, research_error,
                outreach_status, outreach_started_at, outreach_completed_at, outreach_error,
                database_update_status, database_update_started_at,
                database_update_completed_at, database_update_error,
                retry_count, last_retry_at, updated_at
            )
            SELECT lead.id, $5, {}, 1, $6, $6
            FROM {} lead
            WHERE lead.id = $4
            ON CONFLICT (lead_id, lead_source) DO UPDATE SET
                {},
                retry_count = lead_processing_status.retry_count + 1,
                last_retry_at = EXCLUDED.last_retry_at,
                updated_at = EXCLUDED.updated_at
            RETURNING {STATUS_COLUMNS}
            "#,
            stage_reset_values("lead.", 1),
            lead_table(lead_source),
            stage_reset_assignments("lead_processing_status.", 1)
        ))
        .bind(reset.research)
        .bind(reset.outreach)
        .bind(reset.database_update)
        .bind(lead_id)
        .bind(lead_source.as_str())
        .bind(retried_at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn insert_retry_attempts(&self, attempts: &[NewRetryAttempt]) -> LeadflowResult<u64> {
        if attempts.is_empty() {
            return Ok(0);
        }

        let lead_ids: Vec<Uuid> = attempts.iter().map(|a| a.lead_id).collect();
        let sources: Vec<String> = attempts.iter().map(|a| a.lead_source.to_string()).collect();
        let workflows: Vec<String> = attempts.iter().map(|a| a.workflow_name.clone()).collect();
        let retry_types: Vec<String> = attempts.iter().map(|a| a.retry_type.to_string()).collect();
        let requested: Vec<DateTime<Utc>> = attempts.iter().map(|a| a.requested_at).collect();
        let statuses: Vec<String> = attempts.iter().map(|a| a.status.to_string()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO retry_attempts (
                lead_id, lead_source, workflow_name, retry_type, requested_at, status
            )
            SELECT * FROM UNNEST(
                $1::uuid[], $2::text[], $3::text[], $4::text[], $5::timestamptz[], $6::text[]
            )
            "#,
        )
        .bind(&lead_ids)
        .bind(&sources)
        .bind(&workflows)
        .bind(&retry_types)
        .bind(&requested)
        .bind(&statuses)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn lead_error_times_since(
        &self,
        lead_ids: Option<&[Uuid]>,
        since: DateTime<Utc>,
    ) -> LeadflowResult<Vec<LeadErrorTime>> {
        let rows = sqlx::query_as::<_, ErrorTimeRow>(
            r#"
            SELECT lead_id, occurred_at
            FROM workflow_errors
            WHERE lead_id IS NOT NULL
              AND occurred_at >= $1
              AND ($2::uuid[] IS NULL OR lead_id = ANY($2))
            "#,
        )
        .bind(since)
        .bind(lead_ids.map(|ids| ids.to_vec()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LeadErrorTime {
                lead_id: row.lead_id,
                occurred_at: row.occurred_at,
            })
            .collect())
    }

    async fn lead_errors(&self, lead_id: Uuid, limit: i64) -> LeadflowResult<Vec<WorkflowError>> {
        let rows = sqlx::query_as::<_, ErrorRow>(&format!(
            "SELECT {ERROR_COLUMNS} FROM workflow_errors WHERE lead_id = $1 ORDER BY occurred_at DESC LIMIT $2"
        ))
        .bind(lead_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn errors_since(&self, since: DateTime<Utc>) -> LeadflowResult<Vec<WorkflowError>> {
        let rows = sqlx::query_as::<_, ErrorRow>(&format!(
            "SELECT {ERROR_COLUMNS} FROM workflow_errors WHERE occurred_at >= $1 ORDER BY occurred_at"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn recent_errors(&self, limit: i64) -> LeadflowResult<Vec<WorkflowError>> {
        let rows = sqlx::query_as::<_, ErrorRow>(&format!(
            "SELECT {ERROR_COLUMNS} FROM workflow_errors ORDER BY occurred_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn executions_since(
        &self,
        since: DateTime<Utc>,
    ) -> LeadflowResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE started_at >= $1 ORDER BY started_at"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn recent_executions(&self, limit: i64) -> LeadflowResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions ORDER BY started_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn api_usage_since(&self, since: DateTime<Utc>) -> LeadflowResult<Vec<ApiUsage>> {
        let rows = sqlx::query_as::<_, ApiUsageRow>(
            r#"
            SELECT id, model_name, api_service, workflow_name,
                   COALESCE(input_tokens, 0)::int8 AS input_tokens,
                   COALESCE(output_tokens, 0)::int8 AS output_tokens,
                   COALESCE(total_tokens, 0)::int8 AS total_tokens,
                   COALESCE(total_cost, 0)::float8 AS total_cost,
                   called_at
            FROM api_usage
            WHERE called_at >= $1
            ORDER BY called_at
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ApiUsage::from).collect())
    }
}

/// Stage column values in table order, each reset to pending when its flag
/// parameter is true and copied from `qualifier` otherwise
fn stage_reset_values(qualifier: &str, first_param: usize) -> String {
    ["research", "outreach", "database_update"]
        .iter()
        .enumerate()
        .map(|(offset, stage)| (stage, first_param + offset))
        .map(|(stage, param)| {
            format!(
                "CASE WHEN ${param} THEN 'pending' ELSE {qualifier}{stage}_status END, \
                 CASE WHEN ${param} THEN NULL ELSE {qualifier}{stage}_started_at END, \
                 CASE WHEN ${param} THEN NULL ELSE {qualifier}{stage}_completed_at END, \
                 CASE WHEN ${param} THEN NULL ELSE {qualifier}{stage}_error END"
            )
        })
        .collect::<Vec<_>>()
        .join(",\n                   ")
}

/// `SET` assignments resetting stage columns when the bound boolean flags
/// for research, outreach and database_update (consecutive parameters from
/// `first_param`) are true. `qualifier` prefixes current-value references.
fn stage_reset_assignments(qualifier: &str, first_param: usize) -> String {
    ["research", "outreach", "database_update"]
        .iter()
        .enumerate()
        .map(|(offset, stage)| (stage, first_param + offset))
        .map(|(stage, param)| {
            format!(
                "{stage}_status = CASE WHEN ${param} THEN 'pending' ELSE {qualifier}{stage}_status END, \
                 {stage}_started_at = CASE WHEN ${param} THEN NULL ELSE {qualifier}{stage}_started_at END, \
                 {stage}_completed_at = CASE WHEN ${param} THEN NULL ELSE {qualifier}{stage}_completed_at END, \
                 {stage}_error = CASE WHEN ${param} THEN NULL ELSE {qualifier}{stage}_error END"
            )
        })
        .collect::<Vec<_>>()
        .join(",\n                ")
}
