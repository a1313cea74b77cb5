//! # Retry Orchestration
//!
//! Re-opens leads for another pipeline run: the policy decides which stage
//! state a retry type resets, the orchestrator applies it to the store, and the
//! webhook hands the batch to the external workflow engine.

pub mod orchestrator;
pub mod policy;
pub mod webhook;

pub use orchestrator::{
    default_workflow_name, RawRetryRequest, RetryOrchestrator, RetryOutcome, RetryRequest,
    RetryStep, StepFailure,
};
pub use policy::{RetryType, StageReset};
pub use webhook::{
    is_linkedin_workflow, HttpWorkflowTrigger, WebhookPayload, WebhookResult, WorkflowTrigger,
};
