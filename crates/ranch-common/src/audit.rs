//! Audit logging
//!
//! Every administrative mutation and container-control action is logged
//! with the acting identity regardless of outcome:
//! - Manual RCC adjustments
//! - Pricing and charge-mode changes
//! - Admin flag toggles
//! - Container start/stop/restart
//! - Webhook grant processing

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Audit event outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// Audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id
    pub event_id: String,

    /// Timestamp (Unix millis)
    pub timestamp: i64,

    /// Event action (e.g., "rcc_manual_adjust", "container_start")
    pub action: String,

    /// Outcome
    pub outcome: AuditOutcome,

    /// Acting account, when known
    pub actor_id: Option<Uuid>,

    /// Target resource (user id, job id, container name)
    pub target: Option<String>,

    /// Additional details
    pub details: HashMap<String, String>,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(action: &str, outcome: AuditOutcome) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            action: action.to_string(),
            outcome,
            actor_id: None,
            target: None,
            details: HashMap::new(),
        }
    }

    /// Set the acting account
    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Set the target resource
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Add a detail
    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Audit log sink
pub trait AuditSink: Send + Sync {
    /// Write an audit event
    fn write(&self, event: &AuditEvent);
}

/// Console audit sink, emitting through `tracing`
pub struct ConsoleAuditSink;

impl AuditSink for ConsoleAuditSink {
    fn write(&self, event: &AuditEvent) {
        let line = format!(
            "{} {} - actor={} target={}",
            event.action,
            event.event_id,
            event
                .actor_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            event.target.as_deref().unwrap_or("-"),
        );

        match event.outcome {
            AuditOutcome::Success => info!("{}", line),
            AuditOutcome::Failure => warn!("{}", line),
        }
    }
}

/// In-memory audit sink, retained for inspection (tests, admin log view)
#[derive(Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events, newest last
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }

    /// Events matching an action, newest last
    pub fn events_for_action(&self, action: &str) -> Vec<AuditEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn write(&self, event: &AuditEvent) {
        self.events.write().push(event.clone());
    }
}

/// Audit logger fanning events out to its sinks
#[derive(Clone)]
pub struct AuditLogger {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditLogger {
    /// Create a logger writing to the console sink
    pub fn new() -> Self {
        Self {
            sinks: vec![Arc::new(ConsoleAuditSink)],
        }
    }

    /// Create a logger with explicit sinks
    pub fn with_sinks(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    /// Log an audit event
    pub fn log(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.write(&event);
        }
    }

    /// Log a manual RCC adjustment
    pub fn log_wallet_adjust(&self, admin_id: Uuid, user_id: Uuid, delta: i64, reason: &str) {
        self.log(
            AuditEvent::new("rcc_manual_adjust", AuditOutcome::Success)
                .with_actor(admin_id)
                .with_target(user_id.to_string())
                .with_detail("delta", delta.to_string())
                .with_detail("reason", reason),
        );
    }

    /// Log a pricing or charge-mode configuration change
    pub fn log_config_change(&self, admin_id: Uuid, setting: &str, old: &str, new: &str) {
        self.log(
            AuditEvent::new("pricing_config_change", AuditOutcome::Success)
                .with_actor(admin_id)
                .with_detail("setting", setting)
                .with_detail("old_value", old)
                .with_detail("new_value", new),
        );
    }

    /// Log an admin flag toggle
    pub fn log_admin_toggle(&self, admin_id: Uuid, target_user: Uuid, now_admin: bool) {
        self.log(
            AuditEvent::new("admin_toggle", AuditOutcome::Success)
                .with_actor(admin_id)
                .with_target(target_user.to_string())
                .with_detail("is_admin", now_admin.to_string()),
        );
    }

    /// Log a container control action
    pub fn log_container_action(&self, actor_id: Uuid, action: &str, message: &str, ok: bool) {
        let outcome = if ok {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        self.log(
            AuditEvent::new(action, outcome)
                .with_actor(actor_id)
                .with_detail("message", message),
        );
    }

    /// Log a processed (or skipped) payment event
    pub fn log_payment_event(&self, user_id: Option<Uuid>, action: &str, details: &str, ok: bool) {
        let outcome = if ok {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        let mut event = AuditEvent::new(action, outcome).with_detail("details", details);
        if let Some(id) = user_id {
            event = event.with_actor(id);
        }
        self.log(event);
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}
