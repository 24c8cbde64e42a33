//! Full container lifecycle against the recording runtime double

use std::sync::Arc;
use std::time::Duration;

use ranch_common::audit::AuditLogger;
use ranch_common::types::container::ContainerState;
use ranch_common::types::user::User;
use ranch_compute::testing::MockRuntime;
use ranch_compute::{ComputeConfig, ComputeController, StartOutcome};

fn controller(runtime: Arc<MockRuntime>) -> ComputeController {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    ComputeController::new(
        runtime,
        ComputeConfig::default(),
        AuditLogger::with_sinks(vec![]),
    )
}

#[tokio::test]
async fn provision_run_stop_cycle() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.set_container_logs(vec!["server ready".to_string()]);
    let controller = controller(runtime.clone());
    let admin = User::new("ops@example.com").with_admin(true);

    assert_eq!(controller.status().await.state, ContainerState::NotFound);

    let outcome = controller.start_for_user(&admin, 0).await.unwrap();
    let StartOutcome::Accepted(report) = outcome else {
        panic!("admin start should be accepted");
    };
    assert_eq!(report.state, ContainerState::Starting);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(controller.status().await.state, ContainerState::Running);

    let logs = controller.logs(50).await;
    assert!(logs.contains("=== Startup log ==="));
    assert!(logs.contains("[start] Container started"));
    assert!(logs.contains("server ready"));

    let report = controller.stop_for_user(&admin).await.unwrap();
    assert_eq!(report.state, ContainerState::Stopped);
    assert_eq!(controller.status().await.state, ContainerState::Stopped);
}

#[tokio::test]
async fn startup_log_followers_see_progress() {
    let runtime = Arc::new(MockRuntime::new());
    let controller = controller(runtime);

    let mut rx = controller.subscribe_startup_log();
    controller.start().await.unwrap();

    let mut seen_pull = false;
    for _ in 0..32 {
        match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            Ok(Ok(line)) => {
                if line.starts_with("[pull]") {
                    seen_pull = true;
                }
                if line.starts_with("[start]") {
                    break;
                }
            }
            _ => break,
        }
    }
    assert!(seen_pull);
}

#[tokio::test]
async fn broke_user_gets_blocked_not_error() {
    let runtime = Arc::new(MockRuntime::new());
    let controller = controller(runtime.clone());
    let user = User::new("empty@example.com");

    let outcome = controller.start_for_user(&user, 0).await.unwrap();
    let StartOutcome::Blocked { message } = outcome else {
        panic!("expected blocked outcome");
    };
    assert!(message.contains("Top up"));
    assert_eq!(controller.status().await.state, ContainerState::NotFound);
}
