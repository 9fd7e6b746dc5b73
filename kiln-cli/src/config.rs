//! Configuration module
//!
//! Handles CLI configuration: which agent to talk to and how to authenticate.

/// CLI configuration
#[derive(Clone)]
pub struct Config {
    /// URL of the agent service
    pub agent_url: String,
    /// Key sent in the `X-API-Key` header, required for job submission
    pub api_key: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("agent_url", &self.agent_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
