//! Compute jobs and their charge-mode snapshots
//!
//! A job snapshots both its RCC cost and the global charge mode at
//! creation time. Every later refund/charge decision consults those
//! snapshots, never the live pricing configuration, so switching the
//! charge mode mid-flight cannot alter the outcome of jobs already
//! priced under the previous mode.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PricingError, RanchError};

/// Kind of compute work a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "IMAGE_TASK")]
    ImageTask,
    #[serde(rename = "VIDEO_TASK")]
    VideoTask,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ImageTask => "IMAGE_TASK",
            JobType::VideoTask => "VIDEO_TASK",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = RanchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMAGE_TASK" => Ok(JobType::ImageTask),
            "VIDEO_TASK" => Ok(JobType::VideoTask),
            other => Err(PricingError::UnknownJobType(other.to_string()).into()),
        }
    }
}

/// Job lifecycle status; `Succeeded` and `Failed` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Terminal jobs accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a job's cost is debited from the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeMode {
    /// Debit the full cost the instant the job is created;
    /// refund it if the job fails
    OnCreation,
    /// Debit only on successful completion; nothing to refund on failure
    OnCompletion,
}

impl ChargeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeMode::OnCreation => "on_creation",
            ChargeMode::OnCompletion => "on_completion",
        }
    }
}

impl std::fmt::Display for ChargeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeMode {
    type Err = RanchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_creation" => Ok(ChargeMode::OnCreation),
            "on_completion" => Ok(ChargeMode::OnCompletion),
            other => Err(PricingError::UnknownChargeMode(other.to_string()).into()),
        }
    }
}

/// A metered compute job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job id
    pub id: Uuid,

    /// Owning account
    pub user_id: Uuid,

    /// Kind of work
    pub job_type: JobType,

    /// RCC cost snapshot taken at creation time; reused verbatim for any
    /// later refund regardless of later pricing changes
    pub cost_rcc: i64,

    /// Lifecycle status
    pub status: JobStatus,

    /// Whether the owner was an admin at creation (zero-delta bypass)
    pub admin_bypass: bool,

    /// Charge mode snapshot taken at creation time
    pub charge_mode: ChargeMode,

    /// Wall-clock duration, filled on the terminal transition
    pub duration_ms: Option<i64>,

    /// Where the output landed, if any
    pub output_uri: Option<String>,

    /// Opaque client-supplied metadata
    pub metadata: Option<serde_json::Value>,

    /// Creation timestamp (Unix millis)
    pub created_at: i64,

    /// Timestamp of the created -> running transition
    pub started_at: Option<i64>,

    /// Timestamp of the terminal transition
    pub ended_at: Option<i64>,
}

impl Job {
    /// Create a job in the `Created` state with its pricing snapshots
    pub fn new(
        user_id: Uuid,
        job_type: JobType,
        cost_rcc: i64,
        charge_mode: ChargeMode,
        admin_bypass: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            job_type,
            cost_rcc,
            status: JobStatus::Created,
            admin_bypass,
            charge_mode,
            duration_ms: None,
            output_uri: None,
            metadata: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Attach client metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
