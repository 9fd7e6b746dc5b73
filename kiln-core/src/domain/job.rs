//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Branch cloned when a request names a repository but no branch
pub const DEFAULT_BRANCH: &str = "main";

/// Request to execute one pipeline in an isolated container
///
/// Created by the caller and consumed once by the agent.
#[derive(Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Caller-assigned correlation id, echoed back in the result
    pub job_id: i64,

    /// Base64 encoded pipeline document, interpreted by the runner image only
    pub pipeline_b64: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,

    /// Fernet token wrapping a source-control access token
    #[serde(
        default,
        alias = "github_token_encrypted",
        skip_serializing_if = "Option::is_none"
    )]
    pub encrypted_credential: Option<String>,

    /// Container image, falls back to the agent's default image
    #[serde(default, alias = "docker_image", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default)]
    pub env_vars: HashMap<String, String>,

    /// Decimal CPU count (e.g. "1.5")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,

    /// Memory limit in runtime notation (e.g. "512m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,

    /// Wall-time deadline, falls back to the agent's default job timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// When set, the agent answers immediately and POSTs the result here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

impl JobRequest {
    /// Creates a request with only the mandatory fields set
    pub fn new(job_id: i64, pipeline_b64: impl Into<String>) -> Self {
        Self {
            job_id,
            pipeline_b64: pipeline_b64.into(),
            git_url: None,
            git_branch: None,
            encrypted_credential: None,
            image: None,
            env_vars: HashMap::new(),
            cpu_limit: None,
            memory_limit: None,
            timeout_seconds: None,
            callback_url: None,
        }
    }

    /// Branch to clone, defaulting to `main`
    pub fn branch(&self) -> &str {
        self.git_branch
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_BRANCH)
    }
}

impl fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&String> = self.env_vars.keys().collect();
        f.debug_struct("JobRequest")
            .field("job_id", &self.job_id)
            .field("pipeline_b64_len", &self.pipeline_b64.len())
            .field("git_url", &self.git_url)
            .field("git_branch", &self.git_branch)
            .field(
                "encrypted_credential",
                &self.encrypted_credential.as_ref().map(|_| "[REDACTED]"),
            )
            .field("image", &self.image)
            .field("env_vars", &env_keys)
            .field("cpu_limit", &self.cpu_limit)
            .field("memory_limit", &self.memory_limit)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

/// Kind of execution-level fault that aborted a job
///
/// Absent on results where the container ran to completion, whatever its
/// exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    InvalidRequest,
    Workspace,
    Decryption,
    Clone,
    Pipeline,
    ImagePull,
    ContainerRuntime,
    Timeout,
    /// The job's task failed unexpectedly inside the agent
    Internal,
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobErrorKind::InvalidRequest => "invalid_request",
            JobErrorKind::Workspace => "workspace",
            JobErrorKind::Decryption => "decryption",
            JobErrorKind::Clone => "clone",
            JobErrorKind::Pipeline => "pipeline",
            JobErrorKind::ImagePull => "image_pull",
            JobErrorKind::ContainerRuntime => "container_runtime",
            JobErrorKind::Timeout => "timeout",
            JobErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Outcome of one job execution
///
/// Produced once per request and never persisted by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: i64,
    pub success: bool,
    /// Container exit status, absent when execution never completed
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<JobErrorKind>,
    /// Set when stdout or stderr hit the capture limit
    #[serde(default)]
    pub output_truncated: bool,
}

impl JobResult {
    /// Result for a container that ran to completion
    ///
    /// Success is derived from the exit code alone.
    pub fn completed(
        job_id: i64,
        exit_code: i32,
        stdout: String,
        stderr: String,
        output_truncated: bool,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            success: exit_code == 0,
            exit_code: Some(exit_code),
            stdout,
            stderr,
            duration_seconds: elapsed_seconds(started_at, completed_at),
            started_at,
            completed_at,
            error_kind: None,
            output_truncated,
        }
    }

    /// Result for a job aborted by an execution-level fault
    ///
    /// `stdout` carries whatever output was captured before the fault, and
    /// the message explaining the fault is appended to `stderr`.
    pub fn faulted(
        job_id: i64,
        kind: JobErrorKind,
        message: impl Into<String>,
        stdout: String,
        stderr: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let message = message.into();
        let stderr = if stderr.trim().is_empty() {
            message
        } else if stderr.ends_with('\n') {
            format!("{}{}", stderr, message)
        } else {
            format!("{}\n{}", stderr, message)
        };

        Self {
            job_id,
            success: false,
            exit_code: None,
            stdout,
            stderr,
            duration_seconds: elapsed_seconds(started_at, completed_at),
            started_at,
            completed_at,
            error_kind: Some(kind),
            output_truncated: false,
        }
    }

    /// Marks the captured output as truncated
    pub fn with_truncation(mut self, truncated: bool) -> Self {
        self.output_truncated = truncated;
        self
    }

    /// Whether the job was aborted before its container completed
    pub fn is_fault(&self) -> bool {
        self.error_kind.is_some()
    }
}

/// Seconds between two instants, never negative
fn elapsed_seconds(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> f64 {
    let delta = completed_at - started_at;
    match delta.num_microseconds() {
        Some(us) => (us.max(0) as f64) / 1_000_000.0,
        None => delta.num_seconds().max(0) as f64,
    }
}
