//! # Ranch Compute
//!
//! Lifecycle controller for the portal's single GPU compute container.
//!
//! - [`runtime`]: the abstract [`runtime::ContainerRuntime`] the
//!   controller drives; the Docker adapter implements it out of core
//! - [`controller`]: [`controller::ComputeController`] with serialized
//!   start/stop/restart, lock-free status and background provisioning
//! - [`startup_log`]: in-memory provisioning log with live followers
//! - [`testing`]: recording runtime double for tests

pub mod controller;
pub mod runtime;
pub mod startup_log;
pub mod testing;

pub use controller::{
    ComputeConfig, ComputeController, ContainerStatusReport, StartOutcome, StartupLogView,
};
pub use runtime::{
    BindMount, ContainerRuntime, ContainerSpec, HealthPhase, PortMapping, RuntimeStatus,
};
pub use startup_log::StartupLog;
