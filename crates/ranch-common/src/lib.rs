//! # Ranch Common
//!
//! Shared types, errors, and audit logging for the Ranch compute portal.
//!
//! ## Core Types
//!
//! - [`User`]: portal account with admin flag and optional OAuth link
//! - [`LedgerEntry`]: one immutable signed credit delta (the RCC ledger)
//! - [`Job`]: a metered compute job with cost and charge-mode snapshots
//! - [`PaymentRecord`]: audit trail and idempotency guard for payments
//! - [`ContainerState`]: live compute-container state, never persisted
//!
//! ## Audit
//!
//! - [`audit::AuditLogger`]: pluggable-sink audit trail for admin and
//!   container-control actions

pub mod audit;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{
    JobError, PricingError, RanchError, Result, WalletError, WebhookError,
};
pub use types::{
    container::ContainerState,
    job::{ChargeMode, Job, JobStatus, JobType},
    ledger::{LedgerEntry, LedgerReason},
    payment::{PaymentRecord, PaymentStatus, PaymentType},
    user::User,
};

/// Ranch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default base cost of an image task in RCC
pub const DEFAULT_IMAGE_COST: i64 = 1;

/// Default base cost of a video task in RCC
pub const DEFAULT_VIDEO_COST: i64 = 5;

/// Graceful container stop/restart timeout in seconds
pub const CONTAINER_STOP_TIMEOUT_SECS: u64 = 30;

/// Maximum container log lines a single request may tail
pub const MAX_LOG_LINES: usize = 500;
