//! Payment records
//!
//! Payment records are the idempotency guard and audit trail for webhook
//! processing. The gateway event id is unique: at most one record, and
//! therefore at most one ledger grant, per processed external event.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What was purchased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Topup,
    Subscription,
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentType::Topup => f.write_str("topup"),
            PaymentType::Subscription => f.write_str("subscription"),
        }
    }
}

/// Gateway-side payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// One recorded payment event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Record id
    pub id: Uuid,

    /// Paying account
    pub user_id: Uuid,

    /// Top-up or subscription
    pub payment_type: PaymentType,

    /// Amount paid, in minor currency units (cents)
    pub amount: i64,

    /// ISO currency code
    pub currency: String,

    /// Gateway-side status
    pub status: PaymentStatus,

    /// Checkout-session or subscription id at the gateway
    pub external_ref: Option<String>,

    /// Gateway event id; unique, checked before any ledger grant
    pub external_event_id: String,

    /// Creation timestamp (Unix millis)
    pub created_at: i64,
}

impl PaymentRecord {
    /// Create a pending record for a gateway event
    pub fn new(
        user_id: Uuid,
        payment_type: PaymentType,
        amount: i64,
        currency: impl Into<String>,
        external_event_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            payment_type,
            amount,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            external_ref: None,
            external_event_id: external_event_id.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Attach the checkout/subscription reference
    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_pending() {
        let record = PaymentRecord::new(
            Uuid::new_v4(),
            PaymentType::Topup,
            500,
            "usd",
            "evt_123",
        );
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.external_event_id, "evt_123");
    }
}
