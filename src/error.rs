//! Error types for the lead pipeline core.

use thiserror::Error;
use uuid::Uuid;

use crate::models::LeadSource;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LeadflowError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("{} lead(s) not found for source {lead_source}", .missing_ids.len())]
    LeadsNotFound {
        lead_source: LeadSource,
        missing_ids: Vec<Uuid>,
    },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Webhook error: {0}")]
    Webhook(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LeadflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for errors caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::LeadsNotFound { .. })
    }
}

impl From<sqlx::Error> for LeadflowError {
    fn from(err: sqlx::Error) -> Self {
        LeadflowError::Database(err.to_string())
    }
}

impl From<config::ConfigError> for LeadflowError {
    fn from(err: config::ConfigError) -> Self {
        LeadflowError::Configuration(err.to_string())
    }
}

pub type LeadflowResult<T> = Result<T, LeadflowError>;
