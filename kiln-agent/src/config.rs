//! Agent configuration
//!
//! Process-wide settings loaded once at startup and shared read-only by every
//! job: the credential decryption key, the default runner image, the
//! workspace root and the container runtime binary.
//!
//! Values come from the process environment first, then from an `.envrc`
//! file (see [`load_env_file`]) which never overrides variables already set.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use kiln_core::credential::CredentialCipher;

use crate::workspace::WorkspaceError;

pub const DEFAULT_IMAGE: &str = "ghcr.io/kiln-ci/pipeline-runner:latest";
pub const DEFAULT_WORKSPACE_ROOT: &str = "/tmp/kiln-agent-jobs";
pub const DEFAULT_CONTAINER_RUNTIME: &str = "podman";
pub const DEFAULT_PIPELINE_FILE: &str = "pipeline.yaml";
pub const DEFAULT_RUNNER_BINARY: &str = "kiln-runner";
pub const DEFAULT_GIT_USERNAME: &str = "x-access-token";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Startup configuration errors
///
/// Any of these prevents the agent from serving jobs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set. Set it in the environment or in an .envrc file")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Workspace root {path} is not usable: {source}")]
    WorkspaceRoot {
        path: PathBuf,
        #[source]
        source: WorkspaceError,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Agent configuration
///
/// Immutable once built; the engine receives it behind an `Arc`.
pub struct AgentConfig {
    /// Fernet key shared with the credential issuer
    pub encryption_key: SecretString,

    /// Key callers present in the `X-API-Key` header
    pub api_key: SecretString,

    /// Image used when a request does not name one
    pub default_image: String,

    /// Directory under which per-job workspaces are created
    pub workspace_root: PathBuf,

    /// Docker-compatible CLI used to drive containers (podman or docker)
    pub container_runtime: String,

    /// File name the decoded pipeline is written to inside the workspace
    pub pipeline_file: String,

    /// Command run inside the container
    pub runner_command: Vec<String>,

    /// Deadline for jobs that do not set their own
    pub job_timeout: Duration,

    /// Capture limit per output stream
    pub max_output_bytes: usize,

    /// Maximum credential token age, unlimited when absent
    pub credential_ttl: Option<Duration>,

    /// Username presented alongside a decrypted token when cloning
    pub git_username: String,

    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// Delivery attempts for result callbacks
    pub callback_retries: u32,
}

impl AgentConfig {
    /// Creates a configuration with defaults for everything but the secrets
    pub fn new(encryption_key: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            encryption_key: SecretString::from(encryption_key.into()),
            api_key: SecretString::from(api_key.into()),
            default_image: DEFAULT_IMAGE.to_string(),
            workspace_root: PathBuf::from(DEFAULT_WORKSPACE_ROOT),
            container_runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
            pipeline_file: DEFAULT_PIPELINE_FILE.to_string(),
            runner_command: default_runner_command(DEFAULT_PIPELINE_FILE),
            job_timeout: Duration::from_secs(3600),
            max_output_bytes: 16 * 1024 * 1024,
            credential_ttl: None,
            git_username: DEFAULT_GIT_USERNAME.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            callback_retries: 3,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Loads an `.envrc` fallback first, then reads:
    /// - KILN_ENCRYPTION_KEY (required)
    /// - KILN_API_KEY (required)
    /// - KILN_DEFAULT_IMAGE (optional, must not be empty)
    /// - KILN_WORKSPACE_ROOT (optional, default: /tmp/kiln-agent-jobs)
    /// - KILN_CONTAINER_RUNTIME (optional, default: podman)
    /// - KILN_PIPELINE_FILE (optional, default: pipeline.yaml)
    /// - KILN_RUNNER_COMMAND (optional, whitespace separated)
    /// - KILN_JOB_TIMEOUT (optional, seconds, default: 3600)
    /// - KILN_MAX_OUTPUT_BYTES (optional, default: 16 MiB)
    /// - KILN_CREDENTIAL_TTL (optional, seconds)
    /// - KILN_GIT_USERNAME (optional, default: x-access-token)
    /// - KILN_BIND_ADDR (optional, default: 0.0.0.0:8080)
    /// - KILN_CALLBACK_RETRIES (optional, default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        load_env_file();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Builds configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let encryption_key = required("KILN_ENCRYPTION_KEY")?;
        let api_key = required("KILN_API_KEY")?;
        let mut config = Self::new(encryption_key, api_key);

        if let Some(image) = lookup("KILN_DEFAULT_IMAGE") {
            config.default_image = image.trim().to_string();
        }
        if let Some(root) = lookup("KILN_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(root);
        }
        if let Some(runtime) = lookup("KILN_CONTAINER_RUNTIME") {
            config.container_runtime = runtime.trim().to_string();
        }
        if let Some(file) = lookup("KILN_PIPELINE_FILE") {
            config.pipeline_file = file.trim().to_string();
        }
        config.runner_command = match lookup("KILN_RUNNER_COMMAND") {
            Some(command) => command.split_whitespace().map(str::to_string).collect(),
            None => default_runner_command(&config.pipeline_file),
        };

        config.job_timeout =
            Duration::from_secs(parse_var(&lookup, "KILN_JOB_TIMEOUT", 3600u64)?);
        config.max_output_bytes =
            parse_var(&lookup, "KILN_MAX_OUTPUT_BYTES", config.max_output_bytes)?;
        config.credential_ttl = match lookup("KILN_CREDENTIAL_TTL") {
            Some(raw) if !raw.trim().is_empty() => Some(Duration::from_secs(
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::invalid("KILN_CREDENTIAL_TTL", e.to_string()))?,
            )),
            _ => None,
        };
        if let Some(username) = lookup("KILN_GIT_USERNAME") {
            config.git_username = username.trim().to_string();
        }
        if let Some(addr) = lookup("KILN_BIND_ADDR") {
            config.bind_addr = addr.trim().to_string();
        }
        config.callback_retries = parse_var(&lookup, "KILN_CALLBACK_RETRIES", 3u32)?;

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        CredentialCipher::new(self.encryption_key.expose_secret()).map_err(|e| {
            ConfigError::invalid("KILN_ENCRYPTION_KEY", e.to_string())
        })?;

        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Missing("KILN_API_KEY"));
        }

        if self.default_image.is_empty() {
            return Err(ConfigError::invalid(
                "KILN_DEFAULT_IMAGE",
                "default image cannot be empty",
            ));
        }

        if self.container_runtime.is_empty() {
            return Err(ConfigError::invalid(
                "KILN_CONTAINER_RUNTIME",
                "container runtime cannot be empty",
            ));
        }

        if self.pipeline_file.is_empty()
            || self.pipeline_file.contains('/')
            || self.pipeline_file.contains('\\')
            || self.pipeline_file == "."
            || self.pipeline_file == ".."
        {
            return Err(ConfigError::invalid(
                "KILN_PIPELINE_FILE",
                "must be a plain file name",
            ));
        }

        if self.runner_command.is_empty() {
            return Err(ConfigError::invalid(
                "KILN_RUNNER_COMMAND",
                "runner command cannot be empty",
            ));
        }

        if self.job_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "KILN_JOB_TIMEOUT",
                "must be greater than 0",
            ));
        }

        if self.max_output_bytes == 0 {
            return Err(ConfigError::invalid(
                "KILN_MAX_OUTPUT_BYTES",
                "must be greater than 0",
            ));
        }

        if self.bind_addr.is_empty() {
            return Err(ConfigError::invalid("KILN_BIND_ADDR", "cannot be empty"));
        }

        Ok(())
    }

    /// Builds the credential cipher from the configured key and TTL
    pub fn credential_cipher(&self) -> Result<CredentialCipher, ConfigError> {
        let cipher = CredentialCipher::new(self.encryption_key.expose_secret())
            .map_err(|e| ConfigError::invalid("KILN_ENCRYPTION_KEY", e.to_string()))?;
        Ok(cipher.with_ttl(self.credential_ttl.map(|ttl| ttl.as_secs())))
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("encryption_key", &"[REDACTED]")
            .field("api_key", &"[REDACTED]")
            .field("default_image", &self.default_image)
            .field("workspace_root", &self.workspace_root)
            .field("container_runtime", &self.container_runtime)
            .field("pipeline_file", &self.pipeline_file)
            .field("runner_command", &self.runner_command)
            .field("job_timeout", &self.job_timeout)
            .field("max_output_bytes", &self.max_output_bytes)
            .field("credential_ttl", &self.credential_ttl)
            .field("git_username", &self.git_username)
            .field("bind_addr", &self.bind_addr)
            .field("callback_retries", &self.callback_retries)
            .finish()
    }
}

fn default_runner_command(pipeline_file: &str) -> Vec<String> {
    vec![
        DEFAULT_RUNNER_BINARY.to_string(),
        "run".to_string(),
        pipeline_file.to_string(),
    ]
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::invalid(key, e.to_string())),
        _ => Ok(default),
    }
}

/// Loads the first `.envrc` found into the process environment
///
/// Variables already present in the environment are left untouched.
pub fn load_env_file() -> Option<PathBuf> {
    let explicit = std::env::var_os("KILN_ENV_FILE").map(PathBuf::from);
    let cwd = std::env::current_dir().ok();
    let home = std::env::var_os("HOME").map(PathBuf::from);

    let path = match explicit {
        Some(path) => Some(path),
        None => locate_env_file(cwd.as_deref(), home.as_deref()),
    };

    let Some(path) = path else {
        warn!("No .envrc file found, relying on process environment");
        return None;
    };

    match dotenvy::from_path(&path) {
        Ok(()) => {
            info!("Loaded environment variables from {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

/// Searches the working directory, its parents, then the install locations
fn locate_env_file(cwd: Option<&Path>, home: Option<&Path>) -> Option<PathBuf> {
    if let Some(cwd) = cwd {
        for dir in cwd.ancestors() {
            let candidate = dir.join(".envrc");
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    let mut fallbacks = vec![PathBuf::from("/opt/kiln-agent/.envrc")];
    if let Some(home) = home {
        fallbacks.push(home.join("kiln-agent").join(".envrc"));
    }

    fallbacks.into_iter().find(|p| p.is_file())
}
