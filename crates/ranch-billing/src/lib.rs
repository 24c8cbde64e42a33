//! Billing for the Ranch portal
//!
//! Everything that moves RCC (Ranch Compute Credits):
//! - [`pricing`]: the credit policy: per-job-type costs, the global
//!   charge mode and the refund switch, admin-mutable and audited
//! - [`catalog`]: purchasable top-up packs and subscription plans
//! - [`wallet`]: ledger-backed wallet operations under per-user locks
//! - [`jobs`]: job lifecycle with cost and charge-mode snapshots
//! - [`webhook`]: idempotent processing of payment-gateway events
//! - [`admin`]: admin-gated user management, corrections and dashboard

pub mod admin;
pub mod catalog;
pub mod jobs;
pub mod pricing;
pub mod wallet;
pub mod webhook;

pub use admin::{AdminService, DashboardStats};
pub use catalog::{Catalog, CreditPack, SubscriptionPlan};
pub use jobs::{JobService, JobUpdateOutcome};
pub use pricing::{CreditPolicy, JobTypePricing, PricingConfig};
pub use wallet::{CompletionOutcome, Wallet, WalletHistory};
pub use webhook::{CheckoutKind, PaymentEvent, WebhookOutcome, WebhookProcessor};
