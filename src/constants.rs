//! # System Constants
//!
//! Fixed operational boundaries of the lead pipeline core. Values that operators
//! may tune live in [`crate::config`]; the ones here are part of the contract
//! that every consumer must agree on.

/// Status derivation windows and defaults
pub mod status {
    /// Errors newer than this force a lead's overall status to `failed`.
    pub const RECENT_ERROR_WINDOW_MINUTES: i64 = 60;
}

/// Retry orchestration constants
pub mod retry {
    pub const WEBHOOK_ACTION: &str = "retry";
    pub const DEFAULT_WEBHOOK_TIMEOUT_SECONDS: u64 = 30;

    /// Substring of a workflow name that routes the webhook to the LinkedIn endpoint.
    pub const LINKEDIN_WORKFLOW_MARKER: &str = "LinkedIn";

    pub const DEFAULT_LINKEDIN_WORKFLOW_NAME: &str = "LinkedIn Lead Pipeline";
    pub const DEFAULT_APOLLO_WORKFLOW_NAME: &str = "Apollo Lead Pipeline";
}

/// Metrics aggregation constants
pub mod metrics {
    pub const DEFAULT_RECENT_ACTIVITY_PER_SOURCE: usize = 20;
    pub const DEFAULT_RECENT_ACTIVITY_PAGE_SIZE: usize = 20;
    pub const MAX_RECENT_ACTIVITY_PAGE_SIZE: usize = 200;
}

/// Inbound API pagination
pub mod pagination {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 500;
    pub const LEAD_DETAIL_ERROR_LIMIT: i64 = 10;
}
