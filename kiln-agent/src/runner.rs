//! Supervised execution of one job container
//!
//! [`ContainerRunner::run`] makes the image available, starts the container,
//! waits for it under a deadline and collects its output. The container is
//! force-removed on every path once it has been started.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::runtime::{
    CapturedOutput, ContainerHandle, ContainerRuntime, ContainerSpec, RuntimeError,
};

/// Label carrying the job id on every job container
pub const JOB_LABEL: &str = "io.kiln.job-id";

/// Time allowed for best-effort cleanup once the deadline has passed
const CLEANUP_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to pull image {image}: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Job timed out after {}s; the container was killed and removed", .deadline.as_secs())]
    Timeout {
        deadline: Duration,
        partial: CapturedOutput,
    },
}

/// Parameters of one container execution
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub job_id: i64,
    pub image: String,
    pub workspace: PathBuf,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
    pub deadline: Duration,
}

/// Container that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub output: CapturedOutput,
}

/// Runs job containers on a shared runtime
#[derive(Clone)]
pub struct ContainerRunner {
    runtime: Arc<dyn ContainerRuntime>,
    max_output_bytes: usize,
}

impl ContainerRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, max_output_bytes: usize) -> Self {
        Self {
            runtime,
            max_output_bytes,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Pulls `image` unless it is already present locally
    ///
    /// A failing inspect means the runtime itself is unusable and is reported
    /// as such, not as a pull failure.
    pub async fn ensure_image(&self, image: &str) -> Result<(), RunError> {
        if self.runtime.image_exists(image).await? {
            debug!("Image {} already present", image);
            return Ok(());
        }

        self.runtime
            .pull(image)
            .await
            .map_err(|source| RunError::ImagePull {
                image: image.to_string(),
                source,
            })
    }

    /// Executes one container and returns its exit code and output
    ///
    /// The deadline covers the whole run: pulling, starting, waiting and
    /// collecting logs.
    pub async fn run(&self, spec: RunSpec) -> Result<RunOutcome, RunError> {
        let deadline = spec.deadline;
        let expires_at = Instant::now() + deadline;

        match timeout_at(expires_at, self.ensure_image(&spec.image)).await {
            Ok(ready) => ready?,
            Err(_) => {
                warn!(
                    "Image {} was not available within the {}s deadline",
                    spec.image,
                    deadline.as_secs()
                );
                return Err(timed_out(deadline));
            }
        }

        let container = ContainerSpec {
            name: container_name(spec.job_id),
            image: spec.image,
            workspace: spec.workspace,
            command: spec.command,
            env: spec.env,
            cpu_limit: spec.cpu_limit,
            memory_limit: spec.memory_limit,
            labels: BTreeMap::from([(JOB_LABEL.to_string(), spec.job_id.to_string())]),
        };

        info!(
            "Starting container {} (image: {}) for job {}",
            container.name, container.image, spec.job_id
        );

        let handle = match timeout_at(expires_at, self.runtime.run(&container)).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                // A failed start may still have created the container
                self.remove(&ContainerHandle::named(&container.name)).await;
                return Err(RunError::Runtime(e));
            }
            Err(_) => {
                self.remove(&ContainerHandle::named(&container.name)).await;
                return Err(timed_out(deadline));
            }
        };

        let result = self.supervise(&handle, deadline, expires_at).await;
        self.remove(&handle).await;
        result
    }

    async fn supervise(
        &self,
        handle: &ContainerHandle,
        deadline: Duration,
        expires_at: Instant,
    ) -> Result<RunOutcome, RunError> {
        match timeout_at(expires_at, self.runtime.wait(handle)).await {
            Ok(Ok(exit_code)) => {
                let logs = self.runtime.logs(handle, self.max_output_bytes);
                let Ok(output) = timeout_at(expires_at, logs).await else {
                    warn!(
                        "Output of container {} was not collected within the {}s deadline",
                        handle.name,
                        deadline.as_secs()
                    );
                    return Err(timed_out(deadline));
                };
                let output = output?;
                info!(
                    "Container {} exited with code {} (stdout: {} bytes, stderr: {} bytes)",
                    handle.name,
                    exit_code,
                    output.stdout.len(),
                    output.stderr.len()
                );
                Ok(RunOutcome { exit_code, output })
            }
            Ok(Err(e)) => Err(RunError::Runtime(e)),
            Err(_) => {
                warn!(
                    "Container {} exceeded its {}s deadline, killing it",
                    handle.name,
                    deadline.as_secs()
                );
                let logs = self.runtime.logs(handle, self.max_output_bytes);
                let partial = match timeout(CLEANUP_GRACE, logs).await {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => {
                        debug!("No partial output for {}: {}", handle.name, e);
                        CapturedOutput::default()
                    }
                    Err(_) => {
                        debug!("Partial output for {} not collected in time", handle.name);
                        CapturedOutput::default()
                    }
                };
                Err(RunError::Timeout { deadline, partial })
            }
        }
    }

    async fn remove(&self, handle: &ContainerHandle) {
        match timeout(CLEANUP_GRACE, self.runtime.remove(handle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to remove container {}: {}", handle.name, e),
            Err(_) => warn!(
                "Removal of container {} did not finish within {}s",
                handle.name,
                CLEANUP_GRACE.as_secs()
            ),
        }
    }
}

fn timed_out(deadline: Duration) -> RunError {
    RunError::Timeout {
        deadline,
        partial: CapturedOutput::default(),
    }
}

/// Unique container name for a job
pub fn container_name(job_id: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("kiln-job-{}-{}", job_id, &suffix[..12])
}
