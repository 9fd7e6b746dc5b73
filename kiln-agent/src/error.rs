//! Job-level errors
//!
//! Every failure that aborts a job is one [`JobError`]; the engine turns it
//! into a faulted result and never propagates it to the caller.

use kiln_core::credential::CredentialError;
use kiln_core::domain::job::JobErrorKind;
use std::time::Duration;
use thiserror::Error;

use crate::git::CloneError;
use crate::runner::RunError;
use crate::runtime::{CapturedOutput, RuntimeError};
use crate::workspace::WorkspaceError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid job request: {0}")]
    InvalidRequest(String),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Failed to decrypt repository credential: {0}")]
    Decryption(#[from] CredentialError),

    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error("Invalid pipeline: {0}")]
    Pipeline(String),

    #[error("Failed to pull image {image}: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Container runtime error: {0}")]
    ContainerRuntime(#[source] RuntimeError),

    #[error("Job timed out after {}s; the container was killed and removed", .deadline.as_secs())]
    Timeout {
        deadline: Duration,
        partial: CapturedOutput,
    },
}

impl JobError {
    pub fn kind(&self) -> JobErrorKind {
        match self {
            JobError::InvalidRequest(_) => JobErrorKind::InvalidRequest,
            JobError::Workspace(_) => JobErrorKind::Workspace,
            JobError::Decryption(_) => JobErrorKind::Decryption,
            JobError::Clone(_) => JobErrorKind::Clone,
            JobError::Pipeline(_) => JobErrorKind::Pipeline,
            JobError::ImagePull { .. } => JobErrorKind::ImagePull,
            JobError::ContainerRuntime(_) => JobErrorKind::ContainerRuntime,
            JobError::Timeout { .. } => JobErrorKind::Timeout,
        }
    }

    /// Output captured before the fault, if any
    pub fn partial_output(&self) -> Option<&CapturedOutput> {
        match self {
            JobError::Timeout { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

impl From<RunError> for JobError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::ImagePull { image, source } => JobError::ImagePull { image, source },
            RunError::Runtime(source) => JobError::ContainerRuntime(source),
            RunError::Timeout { deadline, partial } => JobError::Timeout { deadline, partial },
        }
    }
}
