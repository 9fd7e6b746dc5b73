//! Health and service information endpoints

use crate::AgentClient;
use crate::error::Result;
use kiln_core::dto::health::{HealthResponse, ServiceInfo};

impl AgentClient {
    /// Fetches the agent's health, including container runtime availability
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Fetches the agent's service name and version
    pub async fn info(&self) -> Result<ServiceInfo> {
        let url = format!("{}/", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
