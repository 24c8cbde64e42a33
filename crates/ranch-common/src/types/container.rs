//! Compute container state
//!
//! Derived live from the container runtime on every query; never stored.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the managed compute container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// No container with the managed name exists
    NotFound,
    /// Provisioning or runtime start in progress
    Starting,
    Running,
    Stopping,
    Stopped,
    /// The runtime reported a failure; details travel in the message
    Error,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::NotFound => "not_found",
            ContainerState::Starting => "starting",
            ContainerState::Running => "running",
            ContainerState::Stopping => "stopping",
            ContainerState::Stopped => "stopped",
            ContainerState::Error => "error",
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
