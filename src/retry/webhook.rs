//! Workflow engine webhook.
//!
//! A retry ends with one POST to the external workflow engine. The call never
//! fails the retry: timeouts, network errors and non-2xx responses all come
//! back as a [`WebhookResult`] with `triggered = false` and a reason.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::RetryType;
use crate::config::WebhookConfig;
use crate::constants;
use crate::error::{LeadflowError, LeadflowResult};
use crate::logging::log_webhook_operation;
use crate::models::LeadSource;

/// Body posted to the workflow engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub action: String,
    pub lead_ids: Vec<Uuid>,
    pub retry_type: RetryType,
    pub timestamp: DateTime<Utc>,
    pub source: LeadSource,
    pub workflow_name: String,
    /// Leads already delivered to their platform; the engine skips re-delivery
    pub already_synced: Vec<Uuid>,
}

impl WebhookPayload {
    pub fn retry(
        lead_ids: Vec<Uuid>,
        retry_type: RetryType,
        source: LeadSource,
        workflow_name: impl Into<String>,
        already_synced: Vec<Uuid>,
    ) -> Self {
        Self {
            action: constants::retry::WEBHOOK_ACTION.to_string(),
            lead_ids,
            retry_type,
            timestamp: Utc::now(),
            source,
            workflow_name: workflow_name.into(),
            already_synced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResult {
    pub triggered: bool,
    pub endpoint: Option<String>,
    pub status_code: Option<u16>,
    pub reason: Option<String>,
}

impl WebhookResult {
    pub fn triggered(endpoint: impl Into<String>, status_code: u16) -> Self {
        Self {
            triggered: true,
            endpoint: Some(endpoint.into()),
            status_code: Some(status_code),
            reason: None,
        }
    }

    pub fn not_triggered(
        endpoint: Option<String>,
        status_code: Option<u16>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            triggered: false,
            endpoint,
            status_code,
            reason: Some(reason.into()),
        }
    }
}

/// Starts a workflow run in the external engine
#[async_trait]
pub trait WorkflowTrigger: Send + Sync + std::fmt::Debug {
    async fn trigger(&self, payload: &WebhookPayload) -> WebhookResult;
}

/// Whether `workflow_name` targets the LinkedIn pipeline (case-sensitive)
pub fn is_linkedin_workflow(workflow_name: &str) -> bool {
    workflow_name.contains(constants::retry::LINKEDIN_WORKFLOW_MARKER)
}

/// HTTP webhook client for the workflow engine
#[derive(Clone)]
pub struct HttpWorkflowTrigger {
    client: Client,
    linkedin_url: Option<String>,
    apollo_url: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpWorkflowTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpWorkflowTrigger")
            .field("linkedin_url", &self.linkedin_url)
            .field("apollo_url", &self.apollo_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpWorkflowTrigger {
    pub fn new(config: &WebhookConfig) -> LeadflowResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("leadflow-core/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                LeadflowError::Webhook(format!("Failed to build webhook client: {e}"))
            })?;

        Ok(Self {
            client,
            linkedin_url: config.linkedin_url.clone(),
            apollo_url: config.apollo_url.clone(),
            timeout: config.timeout(),
        })
    }

    /// Endpoint for a workflow, chosen by the LinkedIn marker in its name
    pub fn endpoint_for(&self, workflow_name: &str) -> Option<&str> {
        if is_linkedin_workflow(workflow_name) {
            self.linkedin_url.as_deref()
        } else {
            self.apollo_url.as_deref()
        }
    }

    async fn post(&self, endpoint: &str, payload: &WebhookPayload) -> WebhookResult {
        debug!(
            endpoint = %endpoint,
            lead_count = payload.lead_ids.len(),
            retry_type = %payload.retry_type,
            "Triggering workflow retry"
        );

        let response = match self.client.post(endpoint).json(payload).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return WebhookResult::not_triggered(
                    Some(endpoint.to_string()),
                    None,
                    format!("Webhook timed out after {}s", self.timeout.as_secs()),
                );
            }
            Err(e) => {
                return WebhookResult::not_triggered(
                    Some(endpoint.to_string()),
                    None,
                    format!("Webhook request failed: {e}"),
                );
            }
        };

        let status = response.status();
        if status.is_success() {
            return WebhookResult::triggered(endpoint, status.as_u16());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        WebhookResult::not_triggered(
            Some(endpoint.to_string()),
            Some(status.as_u16()),
            format!("HTTP {status}: {}", truncate(&body, 200)),
        )
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[async_trait]
impl WorkflowTrigger for HttpWorkflowTrigger {
    async fn trigger(&self, payload: &WebhookPayload) -> WebhookResult {
        let result = match self.endpoint_for(&payload.workflow_name) {
            Some(endpoint) => self.post(endpoint, payload).await,
            None => WebhookResult::not_triggered(
                None,
                None,
                format!(
                    "No webhook endpoint configured for workflow '{}'",
                    payload.workflow_name
                ),
            ),
        };

        log_webhook_operation(
            result.endpoint.as_deref().unwrap_or("<unconfigured>"),
            &payload.lead_ids,
            result.triggered,
            result.status_code,
            result.reason.as_deref(),
        );
        result
    }
}
