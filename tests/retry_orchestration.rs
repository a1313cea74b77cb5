//! Retry orchestration against the in-memory store and a mocked workflow engine.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{lead_error, orchestrator, processing_status, LeadBuilder, RecordingTrigger};
use leadflow_core::config::{FromFailureMode, WebhookConfig};
use leadflow_core::error::LeadflowError;
use leadflow_core::models::{LeadSource, RetryAttemptStatus, Severity, StageStatus};
use leadflow_core::retry::{
    HttpWorkflowTrigger, RawRetryRequest, RetryOrchestrator, RetryRequest, RetryStep, RetryType,
};
use leadflow_core::store::InMemoryLeadStore;

use StageStatus::{Completed, Failed, InProgress, Pending};

fn request(ids: Vec<Uuid>, lead_source: LeadSource, retry_type: RetryType) -> RetryRequest {
    RetryRequest::new(ids, lead_source, None, retry_type).unwrap()
}

#[tokio::test]
async fn research_only_leaves_other_stages_untouched() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();
    let lead = LeadBuilder::new(LeadSource::Apollo)
        .stages(Failed, Completed, InProgress)
        .processed()
        .build();
    store.insert_lead(lead.clone());
    store.insert_processing_status(processing_status(&lead, Failed, Completed, InProgress));

    let outcome = orchestrator(&store, &trigger, FromFailureMode::Full)
        .retry(request(vec![lead.id], LeadSource::Apollo, RetryType::ResearchOnly))
        .await
        .unwrap();

    assert!(outcome.is_clean());
    assert_eq!(outcome.queued, 1);
    assert_eq!(outcome.workflow_name, "Apollo Lead Pipeline");

    let status = store.processing_status(LeadSource::Apollo, lead.id).unwrap();
    assert_eq!(status.stages.research.status, Pending);
    assert_eq!(status.stages.outreach.status, Completed);
    assert_eq!(status.stages.database_update.status, InProgress);
    assert_eq!(status.retry_count, 1);
    assert!(status.last_retry_at.is_some());

    let stored = store.lead(LeadSource::Apollo, lead.id).unwrap();
    assert!(!stored.processed);
    assert_eq!(stored.stages.research.status, Pending);
    assert_eq!(stored.stages.outreach.status, Completed);

    let attempts = store.retry_attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, RetryAttemptStatus::Queued);
    assert_eq!(attempts[0].retry_type, RetryType::ResearchOnly);

    let payloads = trigger.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].lead_ids, vec![lead.id]);
    assert_eq!(payloads[0].action, "retry");
}

#[tokio::test]
async fn research_only_without_a_status_row_keeps_the_lead_stages() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();
    let lead = LeadBuilder::new(LeadSource::Apollo)
        .stages(Failed, Completed, Completed)
        .build();
    store.insert_lead(lead.clone());

    orchestrator(&store, &trigger, FromFailureMode::Full)
        .retry(request(vec![lead.id], LeadSource::Apollo, RetryType::ResearchOnly))
        .await
        .unwrap();

    let status = store.processing_status(LeadSource::Apollo, lead.id).unwrap();
    assert_eq!(status.stages.research.status, Pending);
    assert_eq!(status.stages.outreach.status, Completed);
    assert_eq!(status.stages.database_update.status, Completed);
    assert_eq!(status.retry_count, 1);

    let stored = store.lead(LeadSource::Apollo, lead.id).unwrap();
    assert_eq!(status.stages, stored.stages);
}

#[tokio::test]
async fn missing_leads_are_all_reported_and_nothing_is_written() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();

    let mut ids = Vec::new();
    let mut missing = Vec::new();
    for i in 0..10 {
        if i % 3 == 1 {
            let id = Uuid::new_v4();
            missing.push(id);
            ids.push(id);
        } else {
            let lead = LeadBuilder::new(LeadSource::Linkedin).processed().build();
            ids.push(lead.id);
            store.insert_lead(lead);
        }
    }

    let err = orchestrator(&store, &trigger, FromFailureMode::Full)
        .retry(request(ids.clone(), LeadSource::Linkedin, RetryType::Full))
        .await
        .unwrap_err();

    match err {
        LeadflowError::LeadsNotFound {
            lead_source,
            missing_ids,
        } => {
            assert_eq!(lead_source, LeadSource::Linkedin);
            assert_eq!(missing_ids, missing);
        }
        other => panic!("expected LeadsNotFound, got {other:?}"),
    }

    assert!(store.retry_attempts().is_empty());
    assert!(trigger.payloads().is_empty());
    for id in ids.iter().filter(|id| !missing.contains(id)) {
        assert!(store.lead(LeadSource::Linkedin, *id).unwrap().processed);
        assert!(store.processing_status(LeadSource::Linkedin, *id).is_none());
    }
}

#[tokio::test]
async fn lead_from_the_other_source_counts_as_missing() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();
    let lead = LeadBuilder::new(LeadSource::Apollo).build();
    store.insert_lead(lead.clone());

    let err = orchestrator(&store, &trigger, FromFailureMode::Full)
        .retry(request(vec![lead.id], LeadSource::Linkedin, RetryType::Full))
        .await
        .unwrap_err();
    assert!(matches!(err, LeadflowError::LeadsNotFound { .. }));
}

#[tokio::test]
async fn repeated_retries_increment_retry_count() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();
    let lead = LeadBuilder::new(LeadSource::Linkedin).build();
    store.insert_lead(lead.clone());
    let orchestrator = orchestrator(&store, &trigger, FromFailureMode::Full);

    for _ in 0..2 {
        orchestrator
            .retry(request(vec![lead.id], LeadSource::Linkedin, RetryType::Full))
            .await
            .unwrap();
    }

    let status = store.processing_status(LeadSource::Linkedin, lead.id).unwrap();
    assert_eq!(status.retry_count, 2);
    assert_eq!(store.lead(LeadSource::Linkedin, lead.id).unwrap().retry_count, 2);
    assert_eq!(store.retry_attempts().len(), 2);
    assert_eq!(trigger.payloads().len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn retry_count_grows_by_one_per_retry(
        retries in 1usize..6,
        retry_type in prop::sample::select(RetryType::ALL.to_vec()),
    ) {
        let store = Arc::new(InMemoryLeadStore::new());
        let trigger = RecordingTrigger::accepting();
        let lead = LeadBuilder::new(LeadSource::Apollo).build();
        store.insert_lead(lead.clone());
        let orchestrator = orchestrator(&store, &trigger, FromFailureMode::Full);

        tokio_test::block_on(async {
            for _ in 0..retries {
                orchestrator
                    .retry(request(vec![lead.id], LeadSource::Apollo, retry_type))
                    .await
                    .unwrap();
            }
        });

        let status = store.processing_status(LeadSource::Apollo, lead.id).unwrap();
        prop_assert_eq!(status.retry_count as usize, retries);
        prop_assert_eq!(store.retry_attempts().len(), retries);
    }
}

#[tokio::test]
async fn from_failure_resets_everything_by_default() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();
    let failed = LeadBuilder::new(LeadSource::Apollo).build();
    let completed = LeadBuilder::new(LeadSource::Apollo).build();
    store.insert_lead(failed.clone());
    store.insert_lead(completed.clone());
    store.insert_processing_status(processing_status(&failed, Completed, Failed, Pending));
    store.insert_processing_status(processing_status(&completed, Completed, Completed, Completed));

    let outcome = orchestrator(&store, &trigger, FromFailureMode::Full)
        .retry(request(
            vec![failed.id, completed.id],
            LeadSource::Apollo,
            RetryType::FromFailure,
        ))
        .await
        .unwrap();

    assert_eq!(outcome.not_failed, Some(vec![completed.id]));
    for id in [failed.id, completed.id] {
        let status = store.processing_status(LeadSource::Apollo, id).unwrap();
        assert_eq!(status.stages.research.status, Pending);
        assert_eq!(status.stages.outreach.status, Pending);
        assert_eq!(status.stages.database_update.status, Pending);
    }
}

#[tokio::test]
async fn from_failure_pipeline_mode_keeps_stages_before_the_failure() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();
    let lead = LeadBuilder::new(LeadSource::Apollo)
        .stages(Completed, Failed, Pending)
        .build();
    store.insert_lead(lead.clone());
    store.insert_processing_status(processing_status(&lead, Completed, Failed, Pending));

    orchestrator(&store, &trigger, FromFailureMode::Pipeline)
        .retry(request(vec![lead.id], LeadSource::Apollo, RetryType::FromFailure))
        .await
        .unwrap();

    let status = store.processing_status(LeadSource::Apollo, lead.id).unwrap();
    assert_eq!(status.stages.research.status, Completed);
    assert_eq!(status.stages.outreach.status, Pending);
    assert_eq!(status.stages.database_update.status, Pending);
}

#[tokio::test]
async fn recent_error_marks_a_completed_lead_as_failed_for_from_failure() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();
    let lead = LeadBuilder::new(LeadSource::Linkedin).build();
    store.insert_lead(lead.clone());
    store.insert_processing_status(processing_status(&lead, Completed, Completed, Completed));
    store.insert_error(lead_error(
        &lead,
        Severity::High,
        Utc::now() - ChronoDuration::minutes(10),
    ));

    let outcome = orchestrator(&store, &trigger, FromFailureMode::Full)
        .retry(request(vec![lead.id], LeadSource::Linkedin, RetryType::FromFailure))
        .await
        .unwrap();

    assert_eq!(outcome.not_failed, Some(Vec::new()));
}

#[tokio::test]
async fn already_synced_leads_are_flagged_to_the_engine() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();
    let synced = LeadBuilder::new(LeadSource::Apollo).instantly_synced().build();
    // a heyreach flag on an apollo lead does not count as delivered
    let cross_flagged = LeadBuilder::new(LeadSource::Apollo).heyreach_synced().build();
    store.insert_lead(synced.clone());
    store.insert_lead(cross_flagged.clone());

    let ids = vec![synced.id, cross_flagged.id];
    let outcome = orchestrator(&store, &trigger, FromFailureMode::Full)
        .retry(request(ids.clone(), LeadSource::Apollo, RetryType::OutreachOnly))
        .await
        .unwrap();
    assert_eq!(outcome.already_synced, vec![synced.id]);
    assert_eq!(trigger.payloads()[0].already_synced, vec![synced.id]);

    let outcome = orchestrator(&store, &trigger, FromFailureMode::Full)
        .retry(request(ids, LeadSource::Apollo, RetryType::ResearchOnly))
        .await
        .unwrap();
    assert!(outcome.already_synced.is_empty());
}

#[tokio::test]
async fn failing_step_is_reported_and_later_steps_still_run() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();
    let lead = LeadBuilder::new(LeadSource::Apollo).processed().build();
    store.insert_lead(lead.clone());
    store.fail_operation("upsert_retry_status");

    let outcome = orchestrator(&store, &trigger, FromFailureMode::Full)
        .retry(request(vec![lead.id], LeadSource::Apollo, RetryType::Full))
        .await
        .unwrap();

    assert!(!outcome.is_clean());
    assert_eq!(outcome.step_failures.len(), 1);
    assert_eq!(outcome.step_failures[0].step, RetryStep::UpsertProcessingStatus);
    assert_eq!(outcome.step_failures[0].lead_id, Some(lead.id));

    assert!(!store.lead(LeadSource::Apollo, lead.id).unwrap().processed);
    assert_eq!(store.retry_attempts().len(), 1);
    assert_eq!(trigger.payloads().len(), 1);
    assert!(outcome.webhook.triggered);
}

#[tokio::test]
async fn failed_pre_mutation_read_aborts_the_batch() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();
    let lead = LeadBuilder::new(LeadSource::Apollo).build();
    store.insert_lead(lead.clone());
    store.fail_operation("processing_statuses");

    let err = orchestrator(&store, &trigger, FromFailureMode::Full)
        .retry(request(vec![lead.id], LeadSource::Apollo, RetryType::FromFailure))
        .await
        .unwrap_err();

    assert!(matches!(err, LeadflowError::Database(_)));
    assert!(store.retry_attempts().is_empty());
    assert!(trigger.payloads().is_empty());
}

#[tokio::test]
async fn raw_request_validation_lists_every_invalid_id() {
    let raw = RawRetryRequest {
        lead_ids: vec![
            Uuid::new_v4().to_string(),
            "not-a-uuid".to_string(),
            "42".to_string(),
        ],
        source: "apollo".to_string(),
        workflow_name: None,
        retry_type: "full".to_string(),
    };

    let err = RetryRequest::try_from(raw).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("not-a-uuid"));
    assert!(message.contains("42"));
}

// =============================================================================
// Webhook behavior against a mocked engine
// =============================================================================

fn http_orchestrator(store: &Arc<InMemoryLeadStore>, server: &MockServer) -> RetryOrchestrator {
    let trigger = HttpWorkflowTrigger::new(&WebhookConfig {
        linkedin_url: Some(format!("{}/linkedin", server.uri())),
        apollo_url: Some(format!("{}/apollo", server.uri())),
        timeout_seconds: 1,
    })
    .unwrap();
    RetryOrchestrator::new(store.clone(), Arc::new(trigger), FromFailureMode::Full)
}

#[tokio::test]
async fn webhook_success_posts_the_retry_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/linkedin"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryLeadStore::new());
    let lead = LeadBuilder::new(LeadSource::Linkedin).build();
    store.insert_lead(lead.clone());

    let outcome = http_orchestrator(&store, &server)
        .retry(request(vec![lead.id], LeadSource::Linkedin, RetryType::Full))
        .await
        .unwrap();

    assert!(outcome.webhook.triggered);
    assert_eq!(outcome.webhook.status_code, Some(200));

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = received[0].body_json().unwrap();
    assert_eq!(body["action"], "retry");
    assert_eq!(body["retryType"], "full");
    assert_eq!(body["source"], "linkedin");
    assert_eq!(body["workflowName"], "LinkedIn Lead Pipeline");
    assert_eq!(body["leadIds"][0], lead.id.to_string());
}

#[tokio::test]
async fn webhook_timeout_keeps_the_reset_and_the_queued_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apollo"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryLeadStore::new());
    let lead = LeadBuilder::new(LeadSource::Apollo)
        .stages(Completed, Failed, Pending)
        .processed()
        .build();
    store.insert_lead(lead.clone());
    store.insert_processing_status(processing_status(&lead, Completed, Failed, Pending));

    let outcome = http_orchestrator(&store, &server)
        .retry(request(vec![lead.id], LeadSource::Apollo, RetryType::Full))
        .await
        .unwrap();

    assert!(!outcome.webhook.triggered);
    assert!(outcome
        .webhook
        .reason
        .as_deref()
        .unwrap()
        .contains("timed out"));
    assert!(outcome.step_failures.is_empty());

    let status = store.processing_status(LeadSource::Apollo, lead.id).unwrap();
    assert_eq!(status.stages.outreach.status, Pending);
    assert_eq!(status.retry_count, 1);
    let attempts = store.retry_attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, RetryAttemptStatus::Queued);
}

#[tokio::test]
async fn webhook_error_status_is_reported_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apollo"))
        .respond_with(ResponseTemplate::new(500).set_body_string("engine down"))
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryLeadStore::new());
    let lead = LeadBuilder::new(LeadSource::Apollo).build();
    store.insert_lead(lead.clone());

    let outcome = http_orchestrator(&store, &server)
        .retry(request(vec![lead.id], LeadSource::Apollo, RetryType::Full))
        .await
        .unwrap();

    assert!(!outcome.webhook.triggered);
    assert_eq!(outcome.webhook.status_code, Some(500));
    let reason = outcome.webhook.reason.unwrap();
    assert!(reason.starts_with("HTTP 500"));
    assert!(reason.contains("engine down"));
    assert_eq!(outcome.queued, 1);
}

#[tokio::test]
async fn missing_endpoint_is_not_triggered() {
    let store = Arc::new(InMemoryLeadStore::new());
    let lead = LeadBuilder::new(LeadSource::Apollo).build();
    store.insert_lead(lead.clone());
    let trigger = HttpWorkflowTrigger::new(&WebhookConfig {
        linkedin_url: None,
        apollo_url: None,
        timeout_seconds: 1,
    })
    .unwrap();

    let outcome = RetryOrchestrator::new(store.clone(), Arc::new(trigger), FromFailureMode::Full)
        .retry(request(vec![lead.id], LeadSource::Apollo, RetryType::Full))
        .await
        .unwrap();

    assert!(!outcome.webhook.triggered);
    assert!(outcome.webhook.endpoint.is_none());
    assert_eq!(store.retry_attempts().len(), 1);
}
