//! Health command handler

use anyhow::{Context, Result};
use colored::*;
use kiln_client::AgentClient;
use kiln_core::dto::health::HealthStatus;

use crate::config::Config;

/// Show agent version and container runtime status
pub async fn show_health(config: &Config) -> Result<()> {
    let client = AgentClient::new(&config.agent_url, config.api_key.clone().unwrap_or_default());

    let health = client
        .health()
        .await
        .with_context(|| format!("Failed to reach agent at {}", config.agent_url))?;

    let status = match health.status {
        HealthStatus::Healthy => health.status.to_string().green().bold(),
        HealthStatus::Degraded => health.status.to_string().yellow().bold(),
    };

    println!("Agent:    {}", config.agent_url.cyan());
    println!("Status:   {}", status);
    println!("Version:  {}", health.version);
    match health.runtime_version {
        Some(version) => println!("Runtime:  {}", version),
        None => println!("Runtime:  {}", "unavailable".red()),
    }

    Ok(())
}
