//! Container runtime abstraction
//!
//! The engine drives containers through [`ContainerRuntime`] so that the
//! docker-compatible CLI driver ([`crate::podman::PodmanRuntime`]) can be
//! replaced in tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Mount point of the job workspace inside every container
pub const CONTAINER_WORKDIR: &str = "/workspace";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to execute '{binary}': {source}. Is it installed?")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' failed with exit code {exit_code:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Unexpected output from '{command}': {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error("Failed to prepare container environment: {source}")]
    EnvFile {
        #[source]
        source: std::io::Error,
    },
}

/// Everything needed to start one job container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Host directory mounted at [`CONTAINER_WORKDIR`]
    pub workspace: PathBuf,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
    pub labels: BTreeMap<String, String>,
}

/// Reference to a started container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

impl ContainerHandle {
    /// Handle addressing a container by name only
    ///
    /// Used to clean up after a start that failed before reporting an id.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
        }
    }
}

/// Captured container output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Set when either stream exceeded the capture limit
    pub truncated: bool,
}

/// Container operations used by the job engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Version of the runtime, failing when it cannot serve requests
    async fn version(&self) -> Result<String, RuntimeError>;

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    async fn pull(&self, image: &str) -> Result<(), RuntimeError>;

    /// Starts a detached container
    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError>;

    /// Blocks until the container exits and returns its exit code
    async fn wait(&self, handle: &ContainerHandle) -> Result<i32, RuntimeError>;

    /// Reads the container's output, keeping at most `limit` bytes per stream
    async fn logs(
        &self,
        handle: &ContainerHandle,
        limit: usize,
    ) -> Result<CapturedOutput, RuntimeError>;

    /// Forcibly removes the container, killing it if still running
    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;
}
