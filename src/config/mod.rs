//! # Leadflow Configuration
//!
//! Layered configuration loaded through the `config` crate:
//!
//! 1. Built-in defaults ([`LeadflowConfig::default`])
//! 2. Optional TOML file (`LEADFLOW_CONFIG`, default `config/leadflow.toml`)
//! 3. Environment variables prefixed `LEADFLOW_`, nested with `__`
//!    (e.g. `LEADFLOW_WEBHOOK__TIMEOUT_SECONDS=10`)
//! 4. `DATABASE_URL`, which always wins for `database.url`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use leadflow_core::config::LeadflowConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LeadflowConfig::load()?;
//! println!("binding to {}", config.web.bind_address);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::error::{LeadflowError, LeadflowResult};

const DEFAULT_CONFIG_PATH: &str = "config/leadflow.toml";

/// Root configuration for the lead pipeline core
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LeadflowConfig {
    /// Deployment environment (`development`, `test`, `production`, ...)
    pub environment: String,
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub webhook: WebhookConfig,
    pub retry: RetryConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
    pub request_timeout_ms: u64,
}

/// Target endpoints of the external workflow engine
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub linkedin_url: Option<String>,
    pub apollo_url: Option<String>,
    pub timeout_seconds: u64,
}

/// How `from_failure` retries reset stage state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FromFailureMode {
    /// Reset every stage, same as a `full` retry.
    #[default]
    Full,
    /// Reset the first failed stage and every stage after it.
    Pipeline,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub from_failure_mode: FromFailureMode,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Items each source contributes to the activity feed before merging
    pub recent_activity_per_source: usize,
    /// Items left after merging the activity feed
    pub recent_activity_page_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit filter directive; falls back to an environment-based level
    pub level: Option<String>,
    pub format: LogFormat,
}

impl Default for LeadflowConfig {
    fn default() -> Self {
        Self {
            environment: detect_environment(),
            database: DatabaseConfig::default(),
            web: WebConfig::default(),
            webhook: WebhookConfig::default(),
            retry: RetryConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/leadflow_development".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 10,
            idle_timeout_seconds: 300,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_ms: 60_000,
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            linkedin_url: None,
            apollo_url: None,
            timeout_seconds: constants::retry::DEFAULT_WEBHOOK_TIMEOUT_SECONDS,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            recent_activity_per_source: constants::metrics::DEFAULT_RECENT_ACTIVITY_PER_SOURCE,
            recent_activity_page_size: constants::metrics::DEFAULT_RECENT_ACTIVITY_PAGE_SIZE,
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl LeadflowConfig {
    /// Load from the file named by `LEADFLOW_CONFIG` (or the default path) plus environment.
    pub fn load() -> LeadflowResult<Self> {
        let path = std::env::var("LEADFLOW_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(Some(&path))
    }

    /// Load defaults, an optional file, and environment overrides, then validate.
    pub fn load_from(path: Option<&Path>) -> LeadflowResult<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("LEADFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: LeadflowConfig = builder.build()?.try_deserialize()?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LeadflowResult<()> {
        if self.database.url.trim().is_empty() {
            return Err(LeadflowError::Configuration(
                "database.url must not be empty".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(LeadflowError::Configuration(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.webhook.timeout_seconds == 0 {
            return Err(LeadflowError::Configuration(
                "webhook.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.metrics.recent_activity_page_size == 0 {
            return Err(LeadflowError::Configuration(
                "metrics.recent_activity_page_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Whether unexpected error detail may be returned to API callers.
    pub fn expose_error_details(&self) -> bool {
        !self.is_production()
    }
}

/// Current environment from environment variables
fn detect_environment() -> String {
    std::env::var("LEADFLOW_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = LeadflowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.webhook.timeout(), Duration::from_secs(30));
        assert_eq!(config.retry.from_failure_mode, FromFailureMode::Full);
        assert_eq!(config.metrics.recent_activity_page_size, 20);
    }

    #[test]
    fn test_load_from_toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
environment = "staging"

[webhook]
linkedin_url = "https://engine.example.com/webhook/linkedin-retry"
apollo_url = "https://engine.example.com/webhook/apollo-retry"
timeout_seconds = 12

[retry]
from_failure_mode = "pipeline"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = LeadflowConfig::load_from(Some(file.path())).unwrap();

        assert_eq!(config.environment, "staging");
        assert_eq!(config.webhook.timeout_seconds, 12);
        assert_eq!(
            config.webhook.linkedin_url.as_deref(),
            Some("https://engine.example.com/webhook/linkedin-retry")
        );
        assert_eq!(config.retry.from_failure_mode, FromFailureMode::Pipeline);
        assert_eq!(config.logging.format, LogFormat::Json);
        // untouched sections keep their defaults
        assert_eq!(config.metrics, MetricsConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LeadflowConfig::load_from(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.web, WebConfig::default());
    }

    #[test]
    fn test_zero_webhook_timeout_is_rejected() {
        let mut config = LeadflowConfig::default();
        config.webhook.timeout_seconds = 0;
        assert!(matches!(
            config.validate(),
            Err(LeadflowError::Configuration(_))
        ));
    }

    #[test]
    fn test_error_details_hidden_in_production() {
        let config = LeadflowConfig {
            environment: "Production".to_string(),
            ..LeadflowConfig::default()
        };
        assert!(config.is_production());
        assert!(!config.expose_error_details());
    }
}
