//! # Data Layer
//!
//! Row types of the shared relational store and the enums stored in their
//! text columns. Persistence lives in [`crate::store`]; these types carry no
//! database handles.

pub mod api_usage;
pub mod lead;
pub mod lead_processing_status;
pub mod retry_attempt;
pub mod workflow_error;
pub mod workflow_execution;

pub use api_usage::ApiUsage;
pub use lead::{
    DeliveryPlatform, Lead, LeadListFilter, LeadSource, LeadSyncFlags, PipelineStages, Stage,
    StageRecord, StageStatus,
};
pub use lead_processing_status::LeadProcessingStatus;
pub use retry_attempt::{NewRetryAttempt, RetryAttempt, RetryAttemptStatus};
pub use workflow_error::{LeadErrorTime, Severity, WorkflowError};
pub use workflow_execution::{ExecutionStatus, WorkflowExecution};
