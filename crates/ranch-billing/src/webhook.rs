//! Payment webhook processing
//!
//! Events arrive pre-verified (signature checking belongs to the gateway
//! adapter, not here) and typed. Processing is idempotent: the payment
//! record keyed by the gateway event id is both the audit trail and the
//! replay guard, and it is written before any RCC is granted.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use ranch_common::audit::AuditLogger;
use ranch_common::error::{RanchError, Result};
use ranch_common::types::payment::{PaymentRecord, PaymentStatus, PaymentType};
use ranch_store::Repository;

use crate::catalog::Catalog;
use crate::wallet::Wallet;

/// What a completed checkout bought
#[derive(Debug, Clone, Serialize)]
pub enum CheckoutKind {
    /// One-time pack purchase; `pack_id` comes from checkout metadata
    Topup { pack_id: String },
    /// First invoice of a new subscription
    Subscription { plan_id: String },
}

/// A pre-verified payment-gateway event
#[derive(Debug, Clone, Serialize)]
pub enum PaymentEvent {
    /// A checkout session finished and was paid
    CheckoutCompleted {
        event_id: String,
        user_id: Uuid,
        kind: CheckoutKind,
        session_id: String,
        amount_cents: i64,
        currency: String,
    },
    /// A recurring subscription invoice was paid
    InvoicePaid {
        event_id: String,
        user_id: Uuid,
        plan_id: String,
        invoice_id: String,
        amount_cents: i64,
        currency: String,
    },
    /// A payment attempt failed at the gateway
    PaymentFailed {
        event_id: String,
        user_id: Option<Uuid>,
        message: String,
    },
    /// Any event type this processor does not handle
    Other { event_id: String, event_type: String },
}

impl PaymentEvent {
    /// The gateway's unique event id
    pub fn event_id(&self) -> &str {
        match self {
            PaymentEvent::CheckoutCompleted { event_id, .. }
            | PaymentEvent::InvoicePaid { event_id, .. }
            | PaymentEvent::PaymentFailed { event_id, .. }
            | PaymentEvent::Other { event_id, .. } => event_id,
        }
    }
}

/// Outcome of processing one event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WebhookOutcome {
    /// RCC was granted
    Granted { amount: i64, balance: i64 },
    /// The event id was seen before; nothing was granted again
    AlreadyProcessed,
    /// The event carried nothing to act on (failures, unknown types)
    Ignored,
    /// The event was malformed or referenced an unknown pack/plan
    Rejected { reason: String },
}

/// Idempotent processor for payment-gateway events
pub struct WebhookProcessor {
    repo: Arc<dyn Repository>,
    wallet: Arc<Wallet>,
    catalog: Catalog,
    audit: AuditLogger,
}

impl WebhookProcessor {
    pub fn new(
        repo: Arc<dyn Repository>,
        wallet: Arc<Wallet>,
        catalog: Catalog,
        audit: AuditLogger,
    ) -> Self {
        Self {
            repo,
            wallet,
            catalog,
            audit,
        }
    }

    /// Process one event. Replays of an already-recorded event id return
    /// `AlreadyProcessed` and touch nothing.
    #[instrument(skip(self, event), fields(event_id = %event.event_id()))]
    pub async fn process(&self, event: PaymentEvent) -> Result<WebhookOutcome> {
        if self
            .repo
            .get_payment_by_event_id(event.event_id())
            .await?
            .is_some()
        {
            info!("Replay of processed payment event, skipping");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        match event {
            PaymentEvent::CheckoutCompleted {
                event_id,
                user_id,
                kind,
                session_id,
                amount_cents,
                currency,
            } => {
                let (payment_type, rcc, label) = match &kind {
                    CheckoutKind::Topup { pack_id } => match self.catalog.pack(pack_id) {
                        Some(pack) => (PaymentType::Topup, pack.rcc, pack.id.clone()),
                        None => {
                            return self
                                .reject(&event_id, format!("Unknown pack: {pack_id}"))
                                .await;
                        }
                    },
                    CheckoutKind::Subscription { plan_id } => match self.catalog.plan(plan_id) {
                        Some(plan) => {
                            (PaymentType::Subscription, plan.rcc_per_month, plan.id.clone())
                        }
                        None => {
                            return self
                                .reject(&event_id, format!("Unknown plan: {plan_id}"))
                                .await;
                        }
                    },
                };

                self.record_and_grant(
                    user_id,
                    payment_type,
                    amount_cents,
                    &currency,
                    &event_id,
                    Some(&session_id),
                    rcc,
                    &label,
                )
                .await
            }
            PaymentEvent::InvoicePaid {
                event_id,
                user_id,
                plan_id,
                invoice_id,
                amount_cents,
                currency,
            } => {
                let Some(plan) = self.catalog.plan(&plan_id) else {
                    return self
                        .reject(&event_id, format!("Unknown plan: {plan_id}"))
                        .await;
                };
                let rcc = plan.rcc_per_month;
                let label = plan.id.clone();

                self.record_and_grant(
                    user_id,
                    PaymentType::Subscription,
                    amount_cents,
                    &currency,
                    &event_id,
                    Some(&invoice_id),
                    rcc,
                    &label,
                )
                .await
            }
            PaymentEvent::PaymentFailed {
                user_id, message, ..
            } => {
                warn!(?user_id, %message, "Payment failed at the gateway");
                self.audit
                    .log_payment_event(user_id, "payment_failed", &message, false);
                Ok(WebhookOutcome::Ignored)
            }
            PaymentEvent::Other { event_type, .. } => {
                info!(%event_type, "Unhandled payment event type");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_and_grant(
        &self,
        user_id: Uuid,
        payment_type: PaymentType,
        amount_cents: i64,
        currency: &str,
        event_id: &str,
        external_ref: Option<&str>,
        rcc: i64,
        label: &str,
    ) -> Result<WebhookOutcome> {
        let mut record =
            PaymentRecord::new(user_id, payment_type, amount_cents, currency, event_id);
        record.status = PaymentStatus::Completed;
        if let Some(external_ref) = external_ref {
            record = record.with_external_ref(external_ref);
        }

        // The record lands before the grant; a concurrent replay loses the
        // insert race and is treated as already processed. Any other
        // storage failure propagates so the gateway retries the event.
        match self.repo.create_payment(record).await {
            Ok(_) => {}
            Err(RanchError::Conflict(_)) => return Ok(WebhookOutcome::AlreadyProcessed),
            Err(err) => return Err(err),
        }

        match payment_type {
            PaymentType::Topup => {
                self.wallet.grant_topup(user_id, rcc, event_id).await?;
            }
            PaymentType::Subscription => {
                self.wallet.grant_subscription(user_id, rcc, event_id).await?;
            }
        }
        let balance = self.wallet.balance(user_id).await?;

        self.audit.log_payment_event(
            Some(user_id),
            "payment_granted",
            &format!("{payment_type} {label}: +{rcc} RCC"),
            true,
        );
        info!(%user_id, rcc, %payment_type, "Payment event granted RCC");

        Ok(WebhookOutcome::Granted {
            amount: rcc,
            balance,
        })
    }

    async fn reject(&self, event_id: &str, reason: String) -> Result<WebhookOutcome> {
        warn!(%event_id, %reason, "Rejected payment event");
        self.audit
            .log_payment_event(None, "payment_rejected", &reason, false);
        Ok(WebhookOutcome::Rejected { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranch_store::MemoryStore;

    fn processor() -> (Arc<MemoryStore>, Arc<Wallet>, WebhookProcessor) {
        let repo = Arc::new(MemoryStore::new());
        let audit = AuditLogger::with_sinks(vec![]);
        let wallet = Arc::new(Wallet::new(repo.clone(), audit.clone()));
        let processor =
            WebhookProcessor::new(repo.clone(), wallet.clone(), Catalog::default(), audit);
        (repo, wallet, processor)
    }

    fn checkout(event_id: &str, user_id: Uuid, pack_id: &str) -> PaymentEvent {
        PaymentEvent::CheckoutCompleted {
            event_id: event_id.to_string(),
            user_id,
            kind: CheckoutKind::Topup {
                pack_id: pack_id.to_string(),
            },
            session_id: "cs_1".to_string(),
            amount_cents: 500,
            currency: "usd".to_string(),
        }
    }

    #[tokio::test]
    async fn test_checkout_grants_pack_rcc() {
        let (_, wallet, processor) = processor();
        let user_id = Uuid::new_v4();

        let outcome = processor
            .process(checkout("evt_1", user_id, "small"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Granted {
                amount: 10,
                balance: 10
            }
        );
        assert_eq!(wallet.balance(user_id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let (_, wallet, processor) = processor();
        let user_id = Uuid::new_v4();

        processor
            .process(checkout("evt_2", user_id, "medium"))
            .await
            .unwrap();
        let replay = processor
            .process(checkout("evt_2", user_id, "medium"))
            .await
            .unwrap();

        assert_eq!(replay, WebhookOutcome::AlreadyProcessed);
        assert_eq!(wallet.balance(user_id).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_invoice_grants_plan_rcc() {
        let (_, wallet, processor) = processor();
        let user_id = Uuid::new_v4();

        let outcome = processor
            .process(PaymentEvent::InvoicePaid {
                event_id: "evt_3".to_string(),
                user_id,
                plan_id: "pro".to_string(),
                invoice_id: "in_1".to_string(),
                amount_cents: 2999,
                currency: "usd".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Granted {
                amount: 100,
                balance: 100
            }
        );
        assert_eq!(wallet.balance(user_id).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_unknown_pack_rejected_without_grant() {
        let (_, wallet, processor) = processor();
        let user_id = Uuid::new_v4();

        let outcome = processor
            .process(checkout("evt_4", user_id, "jumbo"))
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Rejected { .. }));
        assert_eq!(wallet.balance(user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_and_event_stays_retryable() {
        use ranch_store::testing::FaultyStore;

        let repo = Arc::new(FaultyStore::new());
        let audit = AuditLogger::with_sinks(vec![]);
        let wallet = Arc::new(Wallet::new(repo.clone(), audit.clone()));
        let processor =
            WebhookProcessor::new(repo.clone(), wallet.clone(), Catalog::default(), audit);
        let user_id = Uuid::new_v4();

        repo.fail_create_payment(true);
        let err = processor
            .process(checkout("evt_7", user_id, "small"))
            .await
            .unwrap_err();
        assert!(matches!(err, RanchError::Storage(_)));
        assert_eq!(wallet.balance(user_id).await.unwrap(), 0);

        // Once the store recovers, the gateway's retry of the same event
        // must still grant.
        repo.fail_create_payment(false);
        let outcome = processor
            .process(checkout("evt_7", user_id, "small"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Granted {
                amount: 10,
                balance: 10
            }
        );
    }

    #[tokio::test]
    async fn test_failure_and_unknown_events_ignored() {
        let (_, _, processor) = processor();

        let failed = processor
            .process(PaymentEvent::PaymentFailed {
                event_id: "evt_5".to_string(),
                user_id: Some(Uuid::new_v4()),
                message: "card declined".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(failed, WebhookOutcome::Ignored);

        let other = processor
            .process(PaymentEvent::Other {
                event_id: "evt_6".to_string(),
                event_type: "customer.updated".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(other, WebhookOutcome::Ignored);
    }
}
