//! In-process runtime double for controller tests
//!
//! Records every call and models just enough daemon state (container,
//! image, running flag) to exercise the controller paths without a
//! container daemon.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use ranch_common::error::{RanchError, Result};

use crate::runtime::{BindMount, ContainerRuntime, ContainerSpec, HealthPhase, RuntimeStatus};

#[derive(Debug, Clone)]
struct MockState {
    container_exists: bool,
    running: bool,
    image_present: bool,
    health: HealthPhase,
}

pub struct MockRuntime {
    state: Mutex<MockState>,
    calls: Mutex<Vec<String>>,
    container_logs: Mutex<Vec<String>>,
    fail_stop: AtomicBool,
    fail_inspect: AtomicBool,
    /// Simulated image pull duration
    pub pull_delay: Duration,
}

impl MockRuntime {
    /// A fresh daemon: no container, image not pulled
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                container_exists: false,
                running: false,
                image_present: false,
                health: HealthPhase::Healthy,
            }),
            calls: Mutex::new(Vec::new()),
            container_logs: Mutex::new(Vec::new()),
            fail_stop: AtomicBool::new(false),
            fail_inspect: AtomicBool::new(false),
            pull_delay: Duration::from_millis(20),
        }
    }

    /// A daemon with the container already up and healthy
    pub fn with_running_container() -> Self {
        let runtime = Self::new();
        {
            let mut state = runtime.state.lock();
            state.container_exists = true;
            state.running = true;
            state.image_present = true;
        }
        runtime
    }

    pub fn set_health(&self, health: HealthPhase) {
        self.state.lock().health = health;
    }

    pub fn set_container_logs(&self, lines: Vec<String>) {
        *self.container_logs.lock() = lines;
    }

    pub fn fail_next_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn fail_inspect(&self, fail: bool) {
        self.fail_inspect.store(fail, Ordering::SeqCst);
    }

    /// Every recorded call, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// How many times a call was made
    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == name).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn inspect(&self, _name: &str) -> Result<Option<RuntimeStatus>> {
        self.record("inspect");
        if self.fail_inspect.load(Ordering::SeqCst) {
            return Err(RanchError::ExternalService(
                "Runtime daemon unavailable".to_string(),
            ));
        }
        let state = self.state.lock();
        if !state.container_exists {
            return Ok(None);
        }
        if state.running {
            Ok(Some(RuntimeStatus::Running {
                health: state.health,
            }))
        } else {
            Ok(Some(RuntimeStatus::Exited))
        }
    }

    async fn create(&self, _spec: &ContainerSpec) -> Result<()> {
        self.record("create");
        self.state.lock().container_exists = true;
        Ok(())
    }

    async fn start(&self, _name: &str) -> Result<()> {
        self.record("start");
        self.state.lock().running = true;
        Ok(())
    }

    async fn stop(&self, _name: &str, _timeout_secs: u64) -> Result<()> {
        self.record("stop");
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(RanchError::ExternalService(
                "Stop request failed".to_string(),
            ));
        }
        self.state.lock().running = false;
        Ok(())
    }

    async fn restart(&self, _name: &str, _timeout_secs: u64) -> Result<()> {
        self.record("restart");
        self.state.lock().running = true;
        Ok(())
    }

    async fn tail_logs(&self, _name: &str, tail: usize) -> Result<Vec<String>> {
        self.record("tail_logs");
        let logs = self.container_logs.lock();
        let skip = logs.len().saturating_sub(tail);
        Ok(logs[skip..].to_vec())
    }

    async fn stream_logs(&self, _name: &str) -> Result<BoxStream<'static, String>> {
        self.record("stream_logs");
        let lines = self.container_logs.lock().clone();
        Ok(stream::iter(lines).boxed())
    }

    async fn image_exists(&self, _image: &str) -> Result<bool> {
        self.record("image_exists");
        Ok(self.state.lock().image_present)
    }

    async fn pull_image(&self, _image: &str) -> Result<BoxStream<'static, String>> {
        self.record("pull_image");
        tokio::time::sleep(self.pull_delay).await;
        self.state.lock().image_present = true;
        Ok(stream::iter(vec![
            "Pulling image".to_string(),
            "Pull complete".to_string(),
        ])
        .boxed())
    }

    async fn ensure_network(&self, _name: &str) -> Result<()> {
        self.record("ensure_network");
        Ok(())
    }

    async fn ensure_binds(&self, _binds: &[BindMount]) -> Result<()> {
        self.record("ensure_binds");
        Ok(())
    }
}
