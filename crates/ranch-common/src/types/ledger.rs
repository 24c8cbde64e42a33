//! RCC credit ledger entries
//!
//! The ledger is the single source of truth for spendable credits:
//! - Entries are immutable and append-only, never updated or deleted
//! - A user's balance is exactly the sum of their entry deltas
//! - `external_ref` carries the idempotency key for gateway-triggered grants

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RanchError;

/// Why a ledger entry was appended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerReason {
    /// Debit for a job (at creation, or at successful completion
    /// under the completion charge mode)
    #[serde(rename = "JOB_RESERVE")]
    JobReserve,

    /// Refund of a creation-time reservation after the job failed
    #[serde(rename = "JOB_RELEASE")]
    JobRelease,

    /// Monthly credit from a paid subscription invoice
    #[serde(rename = "SUBSCRIPTION_GRANT")]
    SubscriptionGrant,

    /// Credit from a completed top-up checkout
    #[serde(rename = "TOPUP_GRANT")]
    TopupGrant,

    /// Admin correction, signed either way
    #[serde(rename = "MANUAL_ADJUST")]
    ManualAdjust,

    /// Zero-delta audit marker for admin-initiated jobs
    #[serde(rename = "ADMIN_BYPASS")]
    AdminBypass,
}

impl LedgerReason {
    /// Canonical string form, matching the stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerReason::JobReserve => "JOB_RESERVE",
            LedgerReason::JobRelease => "JOB_RELEASE",
            LedgerReason::SubscriptionGrant => "SUBSCRIPTION_GRANT",
            LedgerReason::TopupGrant => "TOPUP_GRANT",
            LedgerReason::ManualAdjust => "MANUAL_ADJUST",
            LedgerReason::AdminBypass => "ADMIN_BYPASS",
        }
    }
}

impl std::fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerReason {
    type Err = RanchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JOB_RESERVE" => Ok(LedgerReason::JobReserve),
            "JOB_RELEASE" => Ok(LedgerReason::JobRelease),
            "SUBSCRIPTION_GRANT" => Ok(LedgerReason::SubscriptionGrant),
            "TOPUP_GRANT" => Ok(LedgerReason::TopupGrant),
            "MANUAL_ADJUST" => Ok(LedgerReason::ManualAdjust),
            "ADMIN_BYPASS" => Ok(LedgerReason::AdminBypass),
            other => Err(RanchError::Serialization(format!(
                "Unknown ledger reason: {}",
                other
            ))),
        }
    }
}

/// One immutable signed credit delta attributable to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry id
    pub id: Uuid,

    /// Account the delta applies to
    pub user_id: Uuid,

    /// Signed RCC delta; negative debits, positive credits
    pub delta: i64,

    /// Why the entry exists
    pub reason: LedgerReason,

    /// The job that triggered the entry, for job-related reasons
    pub job_id: Option<Uuid>,

    /// Idempotency key for externally-triggered grants
    /// (payment-gateway event id) or audit tag for manual adjusts
    pub external_ref: Option<String>,

    /// Append timestamp (Unix millis)
    pub created_at: i64,
}

impl LedgerEntry {
    /// Create a new entry
    pub fn new(user_id: Uuid, delta: i64, reason: LedgerReason) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            delta,
            reason,
            job_id: None,
            external_ref: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Attach the triggering job
    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Attach an external reference
    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }
}
