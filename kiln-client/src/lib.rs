//! Kiln HTTP Client
//!
//! A type-safe HTTP client for the Kiln agent API, used by the CLI and by
//! orchestrators dispatching jobs.
//!
//! # Example
//!
//! ```no_run
//! use kiln_client::AgentClient;
//! use kiln_core::domain::job::JobRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = AgentClient::new("http://localhost:8080", "agent-key");
//!
//!     let result = client.execute_job(&JobRequest::new(1, "c3RlcHM6IFtdCg==")).await?;
//!     println!("Job finished: success={}", result.success);
//!     Ok(())
//! }
//! ```

pub mod error;
mod health;
mod jobs;

pub use error::{ClientError, Result};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// Header carrying the agent API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// HTTP client for one Kiln agent
#[derive(Clone)]
pub struct AgentClient {
    /// Base URL of the agent (e.g., "http://localhost:8080")
    base_url: String,
    api_key: String,
    client: Client,
}

impl AgentClient {
    /// Create a new agent client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the agent API (e.g., "http://localhost:8080")
    /// * `api_key` - Key sent in the `X-API-Key` header on job submissions
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(base_url, api_key, Client::new())
    }

    /// Create a new agent client with a custom HTTP client
    ///
    /// Jobs can run for a long time; configure timeouts accordingly.
    pub fn with_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Get the base URL of the agent
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(API_KEY_HEADER, &self.api_key)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
