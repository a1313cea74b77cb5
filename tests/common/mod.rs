#![allow(dead_code)]

pub mod builders;
pub mod strategies;

pub use builders::*;
pub use strategies::*;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use leadflow_core::config::{FromFailureMode, LeadflowConfig};
use leadflow_core::retry::{RetryOrchestrator, WebhookPayload, WebhookResult, WorkflowTrigger};
use leadflow_core::store::InMemoryLeadStore;
use leadflow_core::web::{create_app, AppState};

/// Trigger that records every payload and answers with a fixed result
#[derive(Debug)]
pub struct RecordingTrigger {
    result: WebhookResult,
    payloads: Mutex<Vec<WebhookPayload>>,
}

impl RecordingTrigger {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            result: WebhookResult::triggered("http://engine.test/webhook", 200),
            payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn rejecting(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            result: WebhookResult::not_triggered(
                Some("http://engine.test/webhook".to_string()),
                Some(502),
                reason,
            ),
            payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn payloads(&self) -> Vec<WebhookPayload> {
        self.payloads.lock().clone()
    }
}

#[async_trait]
impl WorkflowTrigger for RecordingTrigger {
    async fn trigger(&self, payload: &WebhookPayload) -> WebhookResult {
        self.payloads.lock().push(payload.clone());
        self.result.clone()
    }
}

pub fn orchestrator(
    store: &Arc<InMemoryLeadStore>,
    trigger: &Arc<RecordingTrigger>,
    mode: FromFailureMode,
) -> RetryOrchestrator {
    RetryOrchestrator::new(store.clone(), trigger.clone(), mode)
}

pub fn test_config() -> LeadflowConfig {
    LeadflowConfig {
        environment: "test".to_string(),
        ..LeadflowConfig::default()
    }
}

pub fn test_app(store: &Arc<InMemoryLeadStore>, trigger: &Arc<RecordingTrigger>) -> axum::Router {
    create_app(AppState::new(test_config(), store.clone(), trigger.clone()))
}
