#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Leadflow Core
//!
//! Backend core of a multi-stage lead-processing pipeline. Leads arrive from
//! two sources (Apollo and LinkedIn), pass through research, outreach and
//! database-update stages run by an external workflow engine, and are
//! delivered to one outreach platform per source (Instantly or HeyReach).
//!
//! ## Components
//!
//! - [`status`] - one canonical lifecycle status per lead, shared by every view
//! - [`sync`] - delivery-platform sync state for a batch of emails
//! - [`retry`] - stage resets, audit records and the retry webhook
//! - [`metrics`] - execution, error, lead-status and cost rollups
//!
//! Everything reads and writes the shared relational store through the
//! [`store::LeadStore`] trait, and [`web`] exposes the components over HTTP.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use leadflow_core::config::LeadflowConfig;
//! use leadflow_core::retry::HttpWorkflowTrigger;
//! use leadflow_core::store::PgLeadStore;
//! use leadflow_core::web::{create_app, AppState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LeadflowConfig::load()?;
//! let store = Arc::new(PgLeadStore::connect(&config.database).await?);
//! let trigger = Arc::new(HttpWorkflowTrigger::new(&config.webhook)?);
//! let app = create_app(AppState::new(config, store, trigger));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod retry;
pub mod status;
pub mod store;
pub mod sync;
pub mod web;

pub use config::LeadflowConfig;
pub use error::{LeadflowError, LeadflowResult};
pub use status::{derive_overall_status, derive_status, DerivedStatus, OverallStatus};
