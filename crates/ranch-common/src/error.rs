//! Error types for the Ranch portal
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using RanchError
pub type Result<T> = std::result::Result<T, RanchError>;

/// Unified error type for Ranch operations
#[derive(Debug, Error)]
pub enum RanchError {
    // Wallet errors
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    // Pricing configuration errors
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    // Job lifecycle errors
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    // Webhook processing errors
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Missing user/job/payment
    #[error("Not found: {0}")]
    NotFound(String),

    // Duplicate resource, e.g. a replayed payment event id
    #[error("Conflict: {0}")]
    Conflict(String),

    // Authentication failures
    #[error("Unauthorized")]
    Unauthorized,

    // Role / ownership failures
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Payment gateway or container runtime failures
    #[error("External service error: {0}")]
    ExternalService(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wallet operation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WalletError {
    #[error("Insufficient RCC balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("Grant amount must be positive")]
    InvalidAmount,
}

/// Pricing configuration errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PricingError {
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Unknown charge mode: {0}")]
    UnknownChargeMode(String),

    #[error("Base cost must be >= 0, got {0}")]
    NegativeBaseCost(i64),

    #[error("Multiplier must be >= 0, got {0}")]
    NegativeMultiplier(f64),
}

/// Job lifecycle errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JobError {
    #[error("Job {job_id} is already terminal ({status})")]
    AlreadyTerminal { job_id: Uuid, status: String },

    #[error("Job {0} not found")]
    NotFound(Uuid),
}

/// Webhook processing errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WebhookError {
    #[error("Missing metadata in payment event: {0}")]
    MissingMetadata(String),

    #[error("Unknown payment event type: {0}")]
    UnknownEventType(String),
}

// Implement From for common external error types
impl From<serde_json::Error> for RanchError {
    fn from(err: serde_json::Error) -> Self {
        RanchError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for RanchError {
    fn from(err: std::io::Error) -> Self {
        RanchError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for RanchError {
    fn from(err: anyhow::Error) -> Self {
        RanchError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_display() {
        let err = WalletError::InsufficientBalance {
            required: 5,
            available: 2,
        };
        assert!(err.to_string().contains("required 5"));
        assert!(err.to_string().contains("available 2"));
    }

    #[test]
    fn test_error_wrapping() {
        let err: RanchError = PricingError::UnknownJobType("AUDIO_TASK".to_string()).into();
        assert!(err.to_string().contains("AUDIO_TASK"));
    }
}
