//! # Web Application State
//!
//! Shared state handed to every handler. The store is constructed once by
//! the caller and shared by every component through `Arc<dyn LeadStore>`.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::LeadflowConfig;
use crate::error::LeadflowError;
use crate::metrics::MetricsService;
use crate::retry::{RetryOrchestrator, WorkflowTrigger};
use crate::store::LeadStore;
use crate::sync::SyncReconciler;
use crate::web::response_types::ApiError;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<LeadflowConfig>,
    pub store: Arc<dyn LeadStore>,
    pub sync: SyncReconciler,
    pub retry: RetryOrchestrator,
    pub metrics: MetricsService,
}

impl AppState {
    pub fn new(
        config: LeadflowConfig,
        store: Arc<dyn LeadStore>,
        trigger: Arc<dyn WorkflowTrigger>,
    ) -> Self {
        let sync = SyncReconciler::new(store.clone());
        let retry = RetryOrchestrator::new(
            store.clone(),
            trigger,
            config.retry.from_failure_mode,
        );
        let metrics = MetricsService::new(store.clone(), config.metrics.clone());

        info!(
            environment = %config.environment,
            from_failure_mode = ?config.retry.from_failure_mode,
            "Web application state initialized"
        );

        Self {
            config: Arc::new(config),
            store,
            sync,
            retry,
            metrics,
        }
    }

    /// Convert a core error, exposing details only outside production
    pub fn api_error(&self, err: LeadflowError) -> ApiError {
        if !err.is_client_error() {
            warn!(error = %err, "Request failed on the server side");
        }
        ApiError::from_leadflow(err, self.config.expose_error_details())
    }
}
