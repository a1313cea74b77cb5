//! # Structured Logging Module
//!
//! Environment-aware structured logging built on `tracing-subscriber`, plus a
//! few helpers that emit one structured event per pipeline operation.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use crate::config::{LeadflowConfig, LogFormat};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging(config: &LeadflowConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let directive = config
            .logging
            .level
            .clone()
            .unwrap_or_else(|| default_log_level(&config.environment).to_string());
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

        let layer = match config.logging.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_filter(filter)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(!config.is_production())
                .with_filter(filter)
                .boxed(),
        };

        // A global subscriber may already be set (tests, embedding binaries)
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            environment = %config.environment,
            level = %directive,
            "Structured logging initialized"
        );
    });
}

/// Default log level for an environment
fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log one retry orchestration step
pub fn log_retry_operation(
    operation: &str,
    lead_source: &str,
    retry_type: &str,
    lead_count: usize,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        lead_source = %lead_source,
        retry_type = %retry_type,
        lead_count = lead_count,
        status = %status,
        details = details,
        "RETRY_OPERATION"
    );
}

/// Log the outcome of a workflow engine webhook call
pub fn log_webhook_operation(
    endpoint: &str,
    lead_ids: &[Uuid],
    triggered: bool,
    status_code: Option<u16>,
    reason: Option<&str>,
) {
    if triggered {
        tracing::info!(
            endpoint = %endpoint,
            lead_count = lead_ids.len(),
            status_code = status_code,
            "WEBHOOK_OPERATION"
        );
    } else {
        tracing::warn!(
            endpoint = %endpoint,
            lead_count = lead_ids.len(),
            status_code = status_code,
            reason = reason,
            "WEBHOOK_OPERATION failed"
        );
    }
}

/// Log a store operation that failed and was degraded or reported
pub fn log_store_operation(operation: &str, section: &str, error: &str) {
    tracing::warn!(
        operation = %operation,
        section = %section,
        error = %error,
        "STORE_OPERATION failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(default_log_level("test"), "debug");
        assert_eq!(default_log_level("development"), "debug");
        assert_eq!(default_log_level("production"), "info");
        assert_eq!(default_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LeadflowConfig::default();
        init_structured_logging(&config);
        init_structured_logging(&config);
    }
}
