//! End-to-end tests against a real container runtime
//!
//! Require podman (or `KILN_CONTAINER_RUNTIME`) and network access to pull
//! `docker.io/library/alpine:3`. Run with `cargo test -- --ignored`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use kiln_agent::config::AgentConfig;
use kiln_agent::podman::PodmanRuntime;
use kiln_agent::service::{JobEngine, JobExecutor};
use kiln_core::credential::CredentialCipher;
use kiln_core::domain::job::{JobErrorKind, JobRequest};
use std::sync::Arc;

const IMAGE: &str = "docker.io/library/alpine:3";

fn engine(command: &[&str], root: &std::path::Path) -> JobEngine {
    let mut config = AgentConfig::new(CredentialCipher::generate_key(), "e2e-key");
    config.workspace_root = root.to_path_buf();
    config.default_image = IMAGE.to_string();
    config.runner_command = command.iter().map(|s| s.to_string()).collect();
    if let Ok(runtime) = std::env::var("KILN_CONTAINER_RUNTIME") {
        config.container_runtime = runtime;
    }

    let runtime = Arc::new(PodmanRuntime::new(config.container_runtime.clone()));
    JobEngine::new(Arc::new(config), runtime).unwrap()
}

fn request(job_id: i64) -> JobRequest {
    JobRequest::new(job_id, STANDARD.encode("steps: []\n"))
}

#[tokio::test]
#[ignore]
async fn test_echo_hello() {
    let root = tempfile::tempdir().unwrap();
    let engine = engine(&["sh", "-c", "echo Hello"], root.path());

    let result = engine.execute(request(1)).await;

    assert!(result.success, "{:?}", result);
    assert_eq!(result.exit_code, Some(0));
    assert!(result.stdout.contains("Hello"));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore]
async fn test_pipeline_visible_in_workspace() {
    let root = tempfile::tempdir().unwrap();
    let engine = engine(&["sh", "-c", "ls /workspace && cat pipeline.yaml"], root.path());

    let result = engine.execute(request(2)).await;

    assert!(result.success, "{:?}", result);
    assert!(result.stdout.contains("pipeline.yaml"));
    assert!(result.stdout.contains("steps: []"));
}

#[tokio::test]
#[ignore]
async fn test_nonzero_exit_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let engine = engine(&["sh", "-c", "echo oops >&2; exit 3"], root.path());

    let result = engine.execute(request(3)).await;

    assert!(!result.success);
    assert_eq!(result.exit_code, Some(3));
    assert!(result.stderr.contains("oops"));
    assert!(result.error_kind.is_none());
}

#[tokio::test]
#[ignore]
async fn test_memory_limit_enforced() {
    let root = tempfile::tempdir().unwrap();
    // Allocates roughly 64 MiB in a shell variable
    let engine = engine(
        &["sh", "-c", "x=$(head -c 67108864 /dev/zero | tr '\\0' a); echo ${#x}"],
        root.path(),
    );

    let mut req = request(4);
    req.memory_limit = Some("16m".to_string());
    let result = engine.execute(req).await;

    assert!(!result.success, "{:?}", result);
    assert_ne!(result.exit_code, Some(0));
}

#[tokio::test]
#[ignore]
async fn test_timeout_kills_container() {
    let root = tempfile::tempdir().unwrap();
    let engine = engine(&["sleep", "60"], root.path());

    let mut req = request(5);
    req.timeout_seconds = Some(2);
    let result = engine.execute(req).await;

    assert_eq!(result.error_kind, Some(JobErrorKind::Timeout));
    assert!(result.exit_code.is_none());
    assert!(result.duration_seconds < 30.0);
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore]
async fn test_missing_image_is_pull_error() {
    let root = tempfile::tempdir().unwrap();
    let engine = engine(&["true"], root.path());

    let mut req = request(6);
    req.image = Some("docker.io/library/kiln-does-not-exist:never".to_string());
    let result = engine.execute(req).await;

    assert_eq!(result.error_kind, Some(JobErrorKind::ImagePull));
}
