//! Request validation
//!
//! Turns a [`JobRequest`] into a [`JobPlan`] before any side effect: the
//! pipeline is decoded, limits are checked and agent defaults are applied.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use kiln_core::domain::job::JobRequest;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::error::JobError;
use crate::runtime::CONTAINER_WORKDIR;

/// Environment variable telling the runner where the workspace is mounted
pub const WORKSPACE_ENV: &str = "KILN_WORKSPACE";
/// Environment variable carrying the job id into the container
pub const JOB_ID_ENV: &str = "KILN_JOB_ID";

const MEMORY_UNITS: &[&str] = &[
    "", "b", "k", "kb", "kib", "m", "mb", "mib", "g", "gb", "gib", "t", "tb", "tib",
];

/// Validated, defaulted view of a request
#[derive(Debug, Clone)]
pub struct JobPlan {
    pub pipeline: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
    pub deadline: Duration,
}

impl JobPlan {
    pub fn from_request(request: &JobRequest, config: &AgentConfig) -> Result<Self, JobError> {
        let pipeline = decode_pipeline(&request.pipeline_b64)?;

        let image = request
            .image
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or(&config.default_image)
            .to_string();

        let cpu_limit = normalize(&request.cpu_limit);
        if let Some(cpus) = &cpu_limit {
            validate_cpu_limit(cpus)?;
        }

        let memory_limit = normalize(&request.memory_limit);
        if let Some(memory) = &memory_limit {
            validate_memory_limit(memory)?;
        }

        if let Some(url) = &request.git_url {
            if url.trim().is_empty() {
                return Err(JobError::InvalidRequest("git_url cannot be empty".into()));
            }
        }

        let mut env = BTreeMap::from([
            (WORKSPACE_ENV.to_string(), CONTAINER_WORKDIR.to_string()),
            (JOB_ID_ENV.to_string(), request.job_id.to_string()),
        ]);
        for (key, value) in &request.env_vars {
            validate_env_name(key)?;
            if value.contains(['\0', '\n', '\r']) {
                return Err(JobError::InvalidRequest(format!(
                    "environment variable {} contains a NUL byte or line break",
                    key
                )));
            }
            env.insert(key.clone(), value.clone());
        }

        let deadline = match request.timeout_seconds {
            Some(0) => {
                return Err(JobError::InvalidRequest(
                    "timeout_seconds must be greater than 0".into(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => config.job_timeout,
        };

        Ok(Self {
            pipeline,
            image,
            env,
            cpu_limit,
            memory_limit,
            deadline,
        })
    }
}

fn normalize(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Decodes a base64 pipeline into UTF-8 text
///
/// Whitespace inside the encoding (line-wrapped base64) is ignored.
pub fn decode_pipeline(encoded: &str) -> Result<String, JobError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| JobError::Pipeline(format!("pipeline_b64 is not valid base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| JobError::Pipeline("decoded pipeline is not valid UTF-8".into()))
}

pub fn validate_cpu_limit(value: &str) -> Result<(), JobError> {
    match value.parse::<f64>() {
        Ok(cpus) if cpus.is_finite() && cpus > 0.0 => Ok(()),
        _ => Err(JobError::InvalidRequest(format!(
            "cpu_limit must be a positive decimal, got '{}'",
            value
        ))),
    }
}

/// Accepts `<number>[unit]` with the units docker and podman understand
pub fn validate_memory_limit(value: &str) -> Result<(), JobError> {
    let invalid = || {
        JobError::InvalidRequest(format!(
            "memory_limit must look like 512m or 2g, got '{}'",
            value
        ))
    };

    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);

    let amount: f64 = number.parse().map_err(|_| invalid())?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(invalid());
    }
    if !MEMORY_UNITS.contains(&unit.to_ascii_lowercase().as_str()) {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_env_name(name: &str) -> Result<(), JobError> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(JobError::InvalidRequest(format!(
            "invalid environment variable name '{}'",
            name
        )))
    }
}
