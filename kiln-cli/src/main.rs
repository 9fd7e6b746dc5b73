//! Kiln CLI
//!
//! Command-line interface for submitting jobs to a Kiln agent and managing
//! credential encryption keys.

mod commands;
mod config;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Kiln CI job agent CLI", long_about = None)]
struct Cli {
    /// Agent URL
    #[arg(long, env = "KILN_AGENT_URL", default_value = "http://localhost:8080")]
    agent_url: String,

    /// Agent API key
    #[arg(long, env = "KILN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        agent_url: cli.agent_url,
        api_key: cli.api_key,
    };

    handle_command(cli.command, &config).await
}
