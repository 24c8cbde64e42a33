//! Abstract container runtime
//!
//! The controller drives one named container through this trait; the
//! concrete Docker adapter lives outside the core. Every call that can
//! block carries a bounded timeout at its call site.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use ranch_common::error::Result;

/// Host-to-container port mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

/// Host path mounted into the container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindMount {
    pub host_path: String,
    pub container_path: String,
}

/// Everything needed to create the managed container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Fixed container name; the controller manages exactly one
    pub name: String,

    /// Image reference, pulled when absent
    pub image: String,

    /// Attached named network
    pub network: String,

    /// Environment variables
    pub env: Vec<(String, String)>,

    /// Published ports
    pub ports: Vec<PortMapping>,

    /// Bind mounts for models and outputs
    pub binds: Vec<BindMount>,

    /// Whether to request GPU devices
    pub gpu: bool,

    /// Health check command, if any
    pub health_cmd: Option<Vec<String>>,
}

/// Health-check phase of a running container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthPhase {
    Starting,
    Healthy,
    Unhealthy,
    Unknown,
}

impl HealthPhase {
    pub fn describe(&self) -> &'static str {
        match self {
            HealthPhase::Starting => "health check starting",
            HealthPhase::Healthy => "healthy",
            HealthPhase::Unhealthy => "unhealthy",
            HealthPhase::Unknown => "health unknown",
        }
    }
}

/// Raw container status as the runtime reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeStatus {
    Created,
    Restarting,
    Running { health: HealthPhase },
    Exited,
    /// Any status string the mapping does not recognize
    Other(String),
}

impl RuntimeStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, RuntimeStatus::Running { .. })
    }
}

/// Driver interface to the container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Status of the named container, `None` when it does not exist
    async fn inspect(&self, name: &str) -> Result<Option<RuntimeStatus>>;

    /// Create the container from its spec; it must not already exist
    async fn create(&self, spec: &ContainerSpec) -> Result<()>;

    /// Start an existing container
    async fn start(&self, name: &str) -> Result<()>;

    /// Gracefully stop, killing after `timeout_secs`
    async fn stop(&self, name: &str, timeout_secs: u64) -> Result<()>;

    /// Restart with the same graceful timeout semantics as stop
    async fn restart(&self, name: &str, timeout_secs: u64) -> Result<()>;

    /// Last `tail` lines of container output
    async fn tail_logs(&self, name: &str, tail: usize) -> Result<Vec<String>>;

    /// Follow container output until the container stops
    async fn stream_logs(&self, name: &str) -> Result<BoxStream<'static, String>>;

    /// Whether the image is present locally
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull the image, yielding human-readable progress lines
    async fn pull_image(&self, image: &str) -> Result<BoxStream<'static, String>>;

    /// Create the named network if missing
    async fn ensure_network(&self, name: &str) -> Result<()>;

    /// Create the bind-mount host paths if missing
    async fn ensure_binds(&self, binds: &[BindMount]) -> Result<()>;
}
