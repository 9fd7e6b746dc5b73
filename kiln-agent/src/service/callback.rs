//! Result delivery for asynchronous jobs
//!
//! When a request carries a `callback_url`, the finished [`JobResult`] is
//! POSTed there with exponential backoff between attempts.

use kiln_core::domain::job::JobResult;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

const INITIAL_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 30_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Invalid callback URL '{0}': only http and https are supported")]
    InvalidUrl(String),

    #[error("Failed to deliver result for job {job_id} after {attempts} attempt(s): {message}")]
    Exhausted {
        job_id: i64,
        attempts: u32,
        message: String,
    },
}

/// POSTs job results to caller-provided URLs
#[derive(Debug, Clone)]
pub struct CallbackNotifier {
    client: reqwest::Client,
    max_attempts: u32,
    initial_delay: Duration,
}

impl CallbackNotifier {
    /// # Arguments
    /// * `max_attempts` - Delivery attempts before giving up (at least one is made)
    pub fn new(max_attempts: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(INITIAL_DELAY_MS),
        }
    }

    /// Overrides the delay before the first retry
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Rejects URLs that could never be delivered to
    pub fn validate_url(url: &str) -> Result<(), CallbackError> {
        let lower = url.trim().to_ascii_lowercase();
        let rest = lower
            .strip_prefix("https://")
            .or_else(|| lower.strip_prefix("http://"));
        match rest {
            Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
            _ => Err(CallbackError::InvalidUrl(url.to_string())),
        }
    }

    /// Delivers `result` to `url`, retrying on transport errors and non-2xx replies
    pub async fn deliver(&self, url: &str, result: &JobResult) -> Result<(), CallbackError> {
        Self::validate_url(url)?;

        let mut attempt = 0;
        let mut delay = self.initial_delay;
        let max_delay = Duration::from_millis(MAX_DELAY_MS);

        loop {
            attempt += 1;

            let message = match self.client.post(url).json(result).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(
                        "Delivered result for job {} to callback (attempt {})",
                        result.job_id, attempt
                    );
                    return Ok(());
                }
                Ok(response) => format!("callback returned {}", response.status()),
                Err(e) => e.to_string(),
            };

            if attempt >= self.max_attempts {
                error!(
                    "Giving up on callback for job {} after {} attempt(s)",
                    result.job_id, attempt
                );
                return Err(CallbackError::Exhausted {
                    job_id: result.job_id,
                    attempts: attempt,
                    message,
                });
            }

            warn!(
                "Callback for job {} failed (attempt {}/{}): {}. Retrying in {:?}",
                result.job_id, attempt, self.max_attempts, message, delay
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        }
    }
}
