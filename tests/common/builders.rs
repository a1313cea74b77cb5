//! Row builders for seeding the in-memory store.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use leadflow_core::models::{
    ApiUsage, ExecutionStatus, Lead, LeadProcessingStatus, LeadSource, PipelineStages, Severity,
    StageStatus, WorkflowError, WorkflowExecution,
};

pub struct LeadBuilder {
    lead: Lead,
}

impl LeadBuilder {
    pub fn new(lead_source: LeadSource) -> Self {
        let email = format!("{}@example.com", Uuid::new_v4().simple());
        Self {
            lead: Lead::new(lead_source, email),
        }
    }

    pub fn email(mut self, email: &str) -> Self {
        self.lead.email = Some(email.to_string());
        self
    }

    pub fn stages(mut self, research: StageStatus, outreach: StageStatus, db: StageStatus) -> Self {
        self.lead.stages = PipelineStages::from_statuses(research, outreach, db);
        self
    }

    pub fn processed(mut self) -> Self {
        self.lead.processed = true;
        self
    }

    pub fn instantly_synced(mut self) -> Self {
        self.lead.instantly_synced = true;
        self.lead.instantly_synced_at = Some(Utc::now() - Duration::days(1));
        self
    }

    pub fn heyreach_synced(mut self) -> Self {
        self.lead.heyreach_synced = true;
        self.lead.heyreach_synced_at = Some(Utc::now() - Duration::days(1));
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.lead.created_at = at;
        self
    }

    pub fn build(self) -> Lead {
        self.lead
    }
}

pub fn processing_status(
    lead: &Lead,
    research: StageStatus,
    outreach: StageStatus,
    db: StageStatus,
) -> LeadProcessingStatus {
    LeadProcessingStatus::new(
        lead.id,
        lead.lead_source,
        PipelineStages::from_statuses(research, outreach, db),
    )
}

pub fn lead_error(lead: &Lead, severity: Severity, occurred_at: DateTime<Utc>) -> WorkflowError {
    WorkflowError {
        id: Uuid::new_v4(),
        workflow_name: "Apollo Lead Pipeline".to_string(),
        node_name: Some("Research Company".to_string()),
        error_type: "http_error".to_string(),
        error_message: Some("upstream returned 500".to_string()),
        severity,
        occurred_at,
        lead_id: Some(lead.id),
        lead_source: Some(lead.lead_source),
    }
}

pub fn execution(status: ExecutionStatus, started_at: DateTime<Utc>) -> WorkflowExecution {
    WorkflowExecution {
        id: Uuid::new_v4(),
        workflow_name: "Apollo Lead Pipeline".to_string(),
        campaign_name: Some("Q3 founders".to_string()),
        status,
        started_at,
        completed_at: status
            .is_terminal()
            .then(|| started_at + Duration::seconds(42)),
        leads_processed: 10,
    }
}

pub fn api_usage(model: &str, workflow: Option<&str>, cost: f64, at: DateTime<Utc>) -> ApiUsage {
    ApiUsage {
        id: Uuid::new_v4(),
        model_name: model.to_string(),
        api_service: "openai".to_string(),
        workflow_name: workflow.map(str::to_string),
        input_tokens: 1_000,
        output_tokens: 250,
        total_tokens: 1_250,
        total_cost: cost,
        called_at: at,
    }
}
