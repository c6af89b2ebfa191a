//! Operator review records for webhooks the reconciler cannot apply cleanly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::Provider;

/// What went wrong with a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    /// No local transaction matches the callback's provider reference.
    UnknownTransaction,
    /// The callback reports a terminal outcome contradicting an
    /// already-recorded different terminal outcome.
    ReconciliationConflict,
}

/// A webhook parked for manual review. These are never auto-resolved; the
/// provider still receives an acknowledgment so re-delivery stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub id: Uuid,
    pub kind: ReviewKind,
    pub provider: Provider,
    pub provider_reference: String,
    pub transaction_id: Option<Uuid>,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

impl ReviewEntry {
    pub fn new(
        kind: ReviewKind,
        provider: Provider,
        provider_reference: String,
        transaction_id: Option<Uuid>,
        detail: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            provider,
            provider_reference,
            transaction_id,
            detail,
            recorded_at: Utc::now(),
        }
    }
}
