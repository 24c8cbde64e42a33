//! Compute container controller
//!
//! Manages exactly one named container. A single async mutex serializes
//! start/stop/restart so they can never interleave against the runtime;
//! status and log reads never take it. Provisioning (network, image pull,
//! create, start, log streaming) runs in a supervised background task and
//! reports progress through the in-memory startup log.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use ranch_common::audit::AuditLogger;
use ranch_common::error::Result;
use ranch_common::types::container::ContainerState;
use ranch_common::types::user::User;
use ranch_common::{CONTAINER_STOP_TIMEOUT_SECS, MAX_LOG_LINES};

use crate::runtime::{
    BindMount, ContainerRuntime, ContainerSpec, PortMapping, RuntimeStatus,
};
use crate::startup_log::StartupLog;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    pub spec: ContainerSpec,

    /// Graceful stop/restart timeout in seconds
    pub stop_timeout_secs: u64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            spec: ContainerSpec {
                name: "ranch-compute".to_string(),
                image: "ranch/comfy-runner:latest".to_string(),
                network: "ranch-net".to_string(),
                env: Vec::new(),
                ports: vec![PortMapping {
                    host: 8188,
                    container: 8188,
                }],
                binds: vec![
                    BindMount {
                        host_path: "/srv/ranch/models".to_string(),
                        container_path: "/models".to_string(),
                    },
                    BindMount {
                        host_path: "/srv/ranch/output".to_string(),
                        container_path: "/output".to_string(),
                    },
                ],
                gpu: true,
                health_cmd: Some(vec![
                    "CMD-SHELL".to_string(),
                    "curl -sf http://localhost:8188/ || exit 1".to_string(),
                ]),
            },
            stop_timeout_secs: CONTAINER_STOP_TIMEOUT_SECS,
        }
    }
}

impl ComputeConfig {
    /// Defaults with environment overrides: `RANCH_CONTAINER_NAME`,
    /// `RANCH_CONTAINER_IMAGE`, `RANCH_CONTAINER_NETWORK`,
    /// `RANCH_CONTAINER_GPU`, `RANCH_STOP_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        if let Ok(name) = std::env::var("RANCH_CONTAINER_NAME") {
            config.spec.name = name;
        }
        if let Ok(image) = std::env::var("RANCH_CONTAINER_IMAGE") {
            config.spec.image = image;
        }
        if let Ok(network) = std::env::var("RANCH_CONTAINER_NETWORK") {
            config.spec.network = network;
        }
        if let Some(gpu) = env_parse::<bool>("RANCH_CONTAINER_GPU") {
            config.spec.gpu = gpu;
        }
        if let Some(timeout) = env_parse::<u64>("RANCH_STOP_TIMEOUT_SECS") {
            config.stop_timeout_secs = timeout;
        }
        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Point-in-time view of the managed container
#[derive(Debug, Clone, Serialize)]
pub struct ContainerStatusReport {
    pub state: ContainerState,
    pub message: Option<String>,
}

impl ContainerStatusReport {
    fn new(state: ContainerState) -> Self {
        Self {
            state,
            message: None,
        }
    }

    fn with_message(state: ContainerState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: Some(message.into()),
        }
    }
}

/// Result of a credit-gated start/restart request
#[derive(Debug, Clone, Serialize)]
pub enum StartOutcome {
    /// The control action went through
    Accepted(ContainerStatusReport),
    /// Non-admin with no credits; a call to action, not an error
    Blocked { message: String },
}

/// Startup log snapshot plus whether provisioning is still running
#[derive(Debug, Clone, Serialize)]
pub struct StartupLogView {
    pub lines: Vec<String>,
    pub in_progress: bool,
}

/// Singleton controller for the compute container
pub struct ComputeController {
    runtime: Arc<dyn ContainerRuntime>,
    config: ComputeConfig,
    control: Mutex<()>,
    provisioning: Arc<AtomicBool>,
    startup_log: Arc<StartupLog>,
    audit: AuditLogger,
}

impl ComputeController {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: ComputeConfig, audit: AuditLogger) -> Self {
        Self {
            runtime,
            config,
            control: Mutex::new(()),
            provisioning: Arc::new(AtomicBool::new(false)),
            startup_log: Arc::new(StartupLog::new()),
            audit,
        }
    }

    /// Start the container, provisioning it in the background.
    ///
    /// Idempotent: already running or already provisioning both report
    /// success without side effects. Returns immediately; progress lands
    /// in the startup log.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<ContainerStatusReport> {
        let _guard = self.control.lock().await;

        if self.provisioning.load(Ordering::SeqCst) {
            return Ok(ContainerStatusReport::with_message(
                ContainerState::Starting,
                "Provisioning already in progress",
            ));
        }

        match self.runtime.inspect(&self.config.spec.name).await {
            Ok(Some(status)) if status.is_running() => {
                return Ok(ContainerStatusReport::with_message(
                    ContainerState::Running,
                    "Container already running",
                ));
            }
            Ok(_) => {}
            Err(err) => {
                // Let the provisioning task surface daemon problems
                warn!(%err, "Inspect failed before start, provisioning anyway");
            }
        }

        self.provisioning.store(true, Ordering::SeqCst);
        self.startup_log.clear();
        self.startup_log.append("[setup] Provisioning requested");

        let runtime = self.runtime.clone();
        let spec = self.config.spec.clone();
        let log = self.startup_log.clone();
        let flag = self.provisioning.clone();
        tokio::spawn(async move {
            Self::provision(runtime, spec, log, flag).await;
        });

        info!(container = %self.config.spec.name, "Container start accepted");
        Ok(ContainerStatusReport::new(ContainerState::Starting))
    }

    /// Credit-gated start for a portal user
    pub async fn start_for_user(&self, user: &User, balance: i64) -> Result<StartOutcome> {
        if let Some(blocked) = self.credit_gate(user, balance, "container_start") {
            return Ok(blocked);
        }
        let report = self.start().await?;
        self.audit.log_container_action(
            user.id,
            "container_start",
            report.message.as_deref().unwrap_or("accepted"),
            report.state != ContainerState::Error,
        );
        Ok(StartOutcome::Accepted(report))
    }

    /// Gracefully stop the container
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<ContainerStatusReport> {
        let _guard = self.control.lock().await;

        match self.runtime.inspect(&self.config.spec.name).await {
            Ok(None) => {
                return Ok(ContainerStatusReport::with_message(
                    ContainerState::NotFound,
                    "No container to stop",
                ));
            }
            Ok(Some(RuntimeStatus::Exited)) => {
                return Ok(ContainerStatusReport::with_message(
                    ContainerState::Stopped,
                    "Container already stopped",
                ));
            }
            Ok(Some(_)) => {}
            Err(err) => {
                return Ok(ContainerStatusReport::with_message(
                    ContainerState::Error,
                    err.to_string(),
                ));
            }
        }

        let timeout = self.config.stop_timeout_secs;
        let stop = self.runtime.stop(&self.config.spec.name, timeout);
        match tokio::time::timeout(Duration::from_secs(timeout + 5), stop).await {
            Ok(Ok(())) => {
                info!(container = %self.config.spec.name, "Container stopped");
                Ok(ContainerStatusReport::new(ContainerState::Stopped))
            }
            Ok(Err(err)) => {
                error!(%err, "Container stop failed");
                Ok(ContainerStatusReport::with_message(
                    ContainerState::Error,
                    err.to_string(),
                ))
            }
            Err(_) => Ok(ContainerStatusReport::with_message(
                ContainerState::Error,
                format!("Stop timed out after {timeout}s"),
            )),
        }
    }

    /// Stop on behalf of a portal user, audited
    pub async fn stop_for_user(&self, user: &User) -> Result<ContainerStatusReport> {
        let report = self.stop().await?;
        self.audit.log_container_action(
            user.id,
            "container_stop",
            report.message.as_deref().unwrap_or("stopped"),
            report.state != ContainerState::Error,
        );
        Ok(report)
    }

    /// Restart the container; delegates to `start` when it does not exist
    #[instrument(skip(self))]
    pub async fn restart(&self) -> Result<ContainerStatusReport> {
        {
            let _guard = self.control.lock().await;

            match self.runtime.inspect(&self.config.spec.name).await {
                Ok(None) => {}
                Ok(Some(_)) => {
                    let timeout = self.config.stop_timeout_secs;
                    let restart = self.runtime.restart(&self.config.spec.name, timeout);
                    return match tokio::time::timeout(
                        Duration::from_secs(timeout + 5),
                        restart,
                    )
                    .await
                    {
                        Ok(Ok(())) => {
                            info!(container = %self.config.spec.name, "Container restarting");
                            Ok(ContainerStatusReport::new(ContainerState::Starting))
                        }
                        Ok(Err(err)) => Ok(ContainerStatusReport::with_message(
                            ContainerState::Error,
                            err.to_string(),
                        )),
                        Err(_) => Ok(ContainerStatusReport::with_message(
                            ContainerState::Error,
                            format!("Restart timed out after {timeout}s"),
                        )),
                    };
                }
                Err(err) => {
                    return Ok(ContainerStatusReport::with_message(
                        ContainerState::Error,
                        err.to_string(),
                    ));
                }
            }
        }
        // Not found: a restart is just a start
        self.start().await
    }

    /// Credit-gated restart for a portal user
    pub async fn restart_for_user(&self, user: &User, balance: i64) -> Result<StartOutcome> {
        if let Some(blocked) = self.credit_gate(user, balance, "container_restart") {
            return Ok(blocked);
        }
        let report = self.restart().await?;
        self.audit.log_container_action(
            user.id,
            "container_restart",
            report.message.as_deref().unwrap_or("accepted"),
            report.state != ContainerState::Error,
        );
        Ok(StartOutcome::Accepted(report))
    }

    /// Live container status. Never fails: runtime errors come back as
    /// an `Error` state with the message.
    pub async fn status(&self) -> ContainerStatusReport {
        match self.runtime.inspect(&self.config.spec.name).await {
            Ok(None) => {
                if self.provisioning.load(Ordering::SeqCst) {
                    ContainerStatusReport::with_message(
                        ContainerState::Starting,
                        "Provisioning in progress",
                    )
                } else {
                    ContainerStatusReport::new(ContainerState::NotFound)
                }
            }
            Ok(Some(RuntimeStatus::Running { health })) => {
                ContainerStatusReport::with_message(ContainerState::Running, health.describe())
            }
            Ok(Some(RuntimeStatus::Created)) | Ok(Some(RuntimeStatus::Restarting)) => {
                ContainerStatusReport::new(ContainerState::Starting)
            }
            Ok(Some(RuntimeStatus::Exited)) => ContainerStatusReport::new(ContainerState::Stopped),
            Ok(Some(RuntimeStatus::Other(raw))) => {
                ContainerStatusReport::with_message(ContainerState::Stopped, raw)
            }
            Err(err) => {
                ContainerStatusReport::with_message(ContainerState::Error, err.to_string())
            }
        }
    }

    /// Startup log concatenated with the container's last `lines` of
    /// output. Degrades to placeholders instead of failing.
    pub async fn logs(&self, lines: usize) -> String {
        let lines = lines.min(MAX_LOG_LINES);
        let mut out = String::new();

        let startup = self.startup_log.snapshot();
        if !startup.is_empty() {
            out.push_str("=== Startup log ===\n");
            for line in &startup {
                out.push_str(line);
                out.push('\n');
            }
        }

        match self.runtime.tail_logs(&self.config.spec.name, lines).await {
            Ok(tail) if !tail.is_empty() => {
                out.push_str("=== Container log ===\n");
                for line in &tail {
                    out.push_str(line);
                    out.push('\n');
                }
            }
            Ok(_) | Err(_) => {
                if out.is_empty() {
                    out.push_str("No logs available yet. Start the container first.\n");
                }
            }
        }

        out
    }

    /// Startup log buffer plus the provisioning flag
    pub fn startup_logs(&self) -> StartupLogView {
        StartupLogView {
            lines: self.startup_log.snapshot(),
            in_progress: self.provisioning.load(Ordering::SeqCst),
        }
    }

    /// Follow startup log lines as they are appended
    pub fn subscribe_startup_log(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.startup_log.subscribe()
    }

    fn credit_gate(&self, user: &User, balance: i64, action: &str) -> Option<StartOutcome> {
        if user.is_admin || balance > 0 {
            return None;
        }
        let message =
            "No RCC balance. Top up credits to start the compute container.".to_string();
        self.audit.log_container_action(user.id, action, &message, false);
        Some(StartOutcome::Blocked { message })
    }

    /// Background provisioning: network, binds, image, container, start,
    /// then stream container output into the startup log until it stops.
    async fn provision(
        runtime: Arc<dyn ContainerRuntime>,
        spec: ContainerSpec,
        log: Arc<StartupLog>,
        flag: Arc<AtomicBool>,
    ) {
        let started = Self::provision_inner(&runtime, &spec, &log).await;
        flag.store(false, Ordering::SeqCst);

        match started {
            Ok(()) => {
                match runtime.stream_logs(&spec.name).await {
                    Ok(mut stream) => {
                        while let Some(line) = stream.next().await {
                            log.append(line);
                        }
                        log.append("[exit] Container log stream ended");
                    }
                    Err(err) => {
                        log.append(format!("[error] Log streaming unavailable: {err}"));
                    }
                }
            }
            Err(err) => {
                error!(%err, "Container provisioning failed");
                log.append(format!("[error] Provisioning failed: {err}"));
            }
        }
    }

    async fn provision_inner(
        runtime: &Arc<dyn ContainerRuntime>,
        spec: &ContainerSpec,
        log: &Arc<StartupLog>,
    ) -> Result<()> {
        log.append(format!("[setup] Ensuring network '{}'", spec.network));
        runtime.ensure_network(&spec.network).await?;
        runtime.ensure_binds(&spec.binds).await?;

        if !runtime.image_exists(&spec.image).await? {
            log.append(format!("[pull] Pulling image '{}'", spec.image));
            let mut progress = runtime.pull_image(&spec.image).await?;
            while let Some(line) = progress.next().await {
                log.append(format!("[pull] {line}"));
            }
        }

        if runtime.inspect(&spec.name).await?.is_none() {
            log.append(format!("[setup] Creating container '{}'", spec.name));
            runtime.create(spec).await?;
        }

        runtime.start(&spec.name).await?;
        log.append("[start] Container started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::HealthPhase;
    use crate::testing::MockRuntime;

    fn controller(runtime: Arc<MockRuntime>) -> ComputeController {
        ComputeController::new(
            runtime,
            ComputeConfig::default(),
            AuditLogger::with_sinks(vec![]),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_start_provisions_fresh_daemon() {
        let runtime = Arc::new(MockRuntime::new());
        let controller = controller(runtime.clone());

        let report = controller.start().await.unwrap();
        assert_eq!(report.state, ContainerState::Starting);

        settle().await;
        assert_eq!(runtime.call_count("ensure_network"), 1);
        assert_eq!(runtime.call_count("pull_image"), 1);
        assert_eq!(runtime.call_count("create"), 1);
        assert_eq!(runtime.call_count("start"), 1);

        let status = controller.status().await;
        assert_eq!(status.state, ContainerState::Running);
    }

    #[tokio::test]
    async fn test_double_start_creates_one_container() {
        let runtime = Arc::new(MockRuntime::new());
        let controller = Arc::new(controller(runtime.clone()));

        let first = controller.start().await.unwrap();
        let second = controller.start().await.unwrap();
        assert_eq!(first.state, ContainerState::Starting);
        assert_eq!(second.state, ContainerState::Starting);

        settle().await;
        assert_eq!(runtime.call_count("create"), 1);
        assert_eq!(runtime.call_count("pull_image"), 1);
    }

    #[tokio::test]
    async fn test_start_noop_when_running() {
        let runtime = Arc::new(MockRuntime::with_running_container());
        let controller = controller(runtime.clone());

        let report = controller.start().await.unwrap();
        assert_eq!(report.state, ContainerState::Running);
        assert_eq!(runtime.call_count("create"), 0);
        assert_eq!(runtime.call_count("start"), 0);
    }

    #[tokio::test]
    async fn test_stop_paths() {
        let runtime = Arc::new(MockRuntime::with_running_container());
        let controller = controller(runtime.clone());

        let report = controller.stop().await.unwrap();
        assert_eq!(report.state, ContainerState::Stopped);

        // Already stopped: success no-op
        let again = controller.stop().await.unwrap();
        assert_eq!(again.state, ContainerState::Stopped);
        assert_eq!(runtime.call_count("stop"), 1);
    }

    #[tokio::test]
    async fn test_stop_missing_container() {
        let runtime = Arc::new(MockRuntime::new());
        let controller = controller(runtime);

        let report = controller.stop().await.unwrap();
        assert_eq!(report.state, ContainerState::NotFound);
    }

    #[tokio::test]
    async fn test_stop_failure_reports_error_state() {
        let runtime = Arc::new(MockRuntime::with_running_container());
        runtime.fail_next_stop(true);
        let controller = controller(runtime);

        let report = controller.stop().await.unwrap();
        assert_eq!(report.state, ContainerState::Error);
        assert!(report.message.unwrap().contains("Stop request failed"));
    }

    #[tokio::test]
    async fn test_restart_existing_container() {
        let runtime = Arc::new(MockRuntime::with_running_container());
        let controller = controller(runtime.clone());

        let report = controller.restart().await.unwrap();
        assert_eq!(report.state, ContainerState::Starting);
        assert_eq!(runtime.call_count("restart"), 1);
    }

    #[tokio::test]
    async fn test_restart_missing_container_starts() {
        let runtime = Arc::new(MockRuntime::new());
        let controller = controller(runtime.clone());

        let report = controller.restart().await.unwrap();
        assert_eq!(report.state, ContainerState::Starting);

        settle().await;
        assert_eq!(runtime.call_count("create"), 1);
        assert_eq!(runtime.call_count("restart"), 0);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let runtime = Arc::new(MockRuntime::with_running_container());
        let controller = controller(runtime.clone());

        runtime.set_health(HealthPhase::Starting);
        let report = controller.status().await;
        assert_eq!(report.state, ContainerState::Running);
        assert_eq!(report.message.as_deref(), Some("health check starting"));

        runtime.fail_inspect(true);
        let report = controller.status().await;
        assert_eq!(report.state, ContainerState::Error);
    }

    #[tokio::test]
    async fn test_status_not_found_without_container() {
        let runtime = Arc::new(MockRuntime::new());
        let controller = controller(runtime);

        let report = controller.status().await;
        assert_eq!(report.state, ContainerState::NotFound);
    }

    #[tokio::test]
    async fn test_credit_gate_blocks_broke_non_admin() {
        let runtime = Arc::new(MockRuntime::new());
        let controller = controller(runtime.clone());
        let user = User::new("broke@example.com");

        let outcome = controller.start_for_user(&user, 0).await.unwrap();
        assert!(matches!(outcome, StartOutcome::Blocked { .. }));
        assert_eq!(runtime.call_count("create"), 0);

        let restart = controller.restart_for_user(&user, -3).await.unwrap();
        assert!(matches!(restart, StartOutcome::Blocked { .. }));
    }

    #[tokio::test]
    async fn test_admin_starts_with_zero_balance() {
        let runtime = Arc::new(MockRuntime::new());
        let controller = controller(runtime.clone());
        let admin = User::new("admin@example.com").with_admin(true);

        let outcome = controller.start_for_user(&admin, 0).await.unwrap();
        assert!(matches!(outcome, StartOutcome::Accepted(_)));

        settle().await;
        assert_eq!(runtime.call_count("start"), 1);
    }

    #[tokio::test]
    async fn test_logs_concatenate_sections() {
        let runtime = Arc::new(MockRuntime::with_running_container());
        runtime.set_container_logs(vec!["booted".to_string(), "listening".to_string()]);
        let controller = controller(runtime);

        // No startup log yet, container logs only
        let logs = controller.logs(10).await;
        assert!(!logs.contains("=== Startup log ==="));
        assert!(logs.contains("=== Container log ==="));
        assert!(logs.contains("listening"));
    }

    #[tokio::test]
    async fn test_logs_placeholder_without_anything() {
        let runtime = Arc::new(MockRuntime::new());
        let controller = controller(runtime);

        let logs = controller.logs(10).await;
        assert!(logs.contains("No logs available yet"));
    }

    #[tokio::test]
    async fn test_startup_log_records_provisioning() {
        let runtime = Arc::new(MockRuntime::new());
        let controller = controller(runtime);

        controller.start().await.unwrap();
        settle().await;

        let view = controller.startup_logs();
        assert!(!view.in_progress);
        assert!(view.lines.iter().any(|l| l.contains("[pull]")));
        assert!(view.lines.iter().any(|l| l == "[start] Container started"));
    }
}
