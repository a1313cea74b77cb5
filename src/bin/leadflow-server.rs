//! # Leadflow Server
//!
//! Runs the lead pipeline API as a standalone server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with config/leadflow.toml and environment overrides
//! cargo run --bin leadflow-server
//!
//! # Run against another config file in production mode
//! LEADFLOW_ENV=production LEADFLOW_CONFIG=/etc/leadflow.toml cargo run --bin leadflow-server
//! ```

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use leadflow_core::config::LeadflowConfig;
use leadflow_core::logging;
use leadflow_core::retry::HttpWorkflowTrigger;
use leadflow_core::store::PgLeadStore;
use leadflow_core::web::{create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LeadflowConfig::load().context("Failed to load configuration")?;
    logging::init_structured_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        build_mode = if cfg!(debug_assertions) { "debug" } else { "release" },
        "Starting Leadflow server"
    );

    let store = PgLeadStore::connect(&config.database)
        .await
        .context("Failed to connect to the database")?;
    let trigger =
        HttpWorkflowTrigger::new(&config.webhook).context("Failed to build webhook client")?;

    let bind_address = config.web.bind_address.clone();
    let state = AppState::new(config, Arc::new(store), Arc::new(trigger));
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!(address = %bind_address, "Web API listening; press Ctrl+C to shut down");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server terminated unexpectedly")?;

    info!("Leadflow server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
