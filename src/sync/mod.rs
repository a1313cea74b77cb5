//! # Sync Reconciliation
//!
//! Merges the cached delivery-platform flags of a lead into one view.
//!
//! Apollo leads are delivered through Instantly and LinkedIn leads through
//! HeyReach. A flag on the other platform is ignored and never reported, so
//! `overall_synced` is exactly the flag of the lead's own platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::LeadflowResult;
use crate::models::{DeliveryPlatform, Lead, LeadSource, LeadSyncFlags};
use crate::store::{normalize_email, LeadStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSync {
    pub synced: bool,
    pub synced_at: Option<DateTime<Utc>>,
}

impl PlatformSync {
    fn synced_at(at: Option<DateTime<Utc>>) -> Self {
        Self {
            synced: true,
            synced_at: at,
        }
    }
}

/// Reconciled delivery state of one lead (or one email)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub instantly: PlatformSync,
    pub heyreach: PlatformSync,
    pub overall_synced: bool,
    /// Source of the row the status was read from; absent for unknown emails
    pub lead_source: Option<LeadSource>,
}

impl SyncStatus {
    /// Status of an email with no matching lead
    pub fn not_synced() -> Self {
        Self::default()
    }

    /// Reconcile the flags of one lead row
    pub fn from_flags(flags: &LeadSyncFlags) -> Self {
        reconcile(
            flags.lead_source,
            (flags.instantly_synced, flags.instantly_synced_at),
            (flags.heyreach_synced, flags.heyreach_synced_at),
        )
    }

    pub fn for_lead(lead: &Lead) -> Self {
        reconcile(
            lead.lead_source,
            (lead.instantly_synced, lead.instantly_synced_at),
            (lead.heyreach_synced, lead.heyreach_synced_at),
        )
    }

    /// Choose between two rows for the same email.
    /// A synced row wins over an unsynced one, otherwise the first row stays.
    /// Rows are never mixed, so the platforms always match `lead_source`.
    fn merge(self, other: SyncStatus) -> Self {
        if !self.overall_synced && other.overall_synced {
            other
        } else {
            self
        }
    }
}

fn reconcile(
    lead_source: LeadSource,
    instantly: (bool, Option<DateTime<Utc>>),
    heyreach: (bool, Option<DateTime<Utc>>),
) -> SyncStatus {
    let (platform_flag, other_flag) = match lead_source.delivery_platform() {
        DeliveryPlatform::Instantly => (instantly, heyreach),
        DeliveryPlatform::Heyreach => (heyreach, instantly),
    };

    if other_flag.0 {
        warn!(
            lead_source = %lead_source,
            associated_platform = %lead_source.delivery_platform(),
            "Ignoring sync flag on the non-associated delivery platform"
        );
    }

    let own = if platform_flag.0 {
        PlatformSync::synced_at(platform_flag.1)
    } else {
        PlatformSync::default()
    };

    let (instantly, heyreach) = match lead_source.delivery_platform() {
        DeliveryPlatform::Instantly => (own, PlatformSync::default()),
        DeliveryPlatform::Heyreach => (PlatformSync::default(), own),
    };

    SyncStatus {
        instantly,
        heyreach,
        overall_synced: own.synced,
        lead_source: Some(lead_source),
    }
}

/// Batch sync lookups against the shared store
#[derive(Debug, Clone)]
pub struct SyncReconciler {
    store: Arc<dyn LeadStore>,
}

impl SyncReconciler {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }

    /// Sync status of every requested email, in one store round-trip.
    ///
    /// The map holds an entry for each distinct input email, keyed exactly as
    /// given; emails without a lead map to [`SyncStatus::not_synced`].
    pub async fn check_sync(&self, emails: &[String]) -> LeadflowResult<HashMap<String, SyncStatus>> {
        if emails.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = self.store.sync_flags_by_email(emails).await?;

        let mut by_email: HashMap<String, SyncStatus> = HashMap::new();
        for row in &rows {
            let status = SyncStatus::from_flags(row);
            by_email
                .entry(normalize_email(&row.email))
                .and_modify(|existing| *existing = existing.merge(status))
                .or_insert(status);
        }

        let result: HashMap<String, SyncStatus> = emails
            .iter()
            .map(|email| {
                let status = by_email
                    .get(&normalize_email(email))
                    .copied()
                    .unwrap_or_else(SyncStatus::not_synced);
                (email.clone(), status)
            })
            .collect();

        debug!(
            requested = emails.len(),
            matched_rows = rows.len(),
            "Checked delivery sync status"
        );
        Ok(result)
    }
}
