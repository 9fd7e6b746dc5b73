//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod credential;
mod health;
mod job;

pub use credential::CredentialCommands;
pub use job::JobCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Job execution
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Check agent health
    Health,
    /// Credential encryption helpers
    Credential {
        #[command(subcommand)]
        command: CredentialCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Health => health::show_health(config).await,
        Commands::Credential { command } => credential::handle_credential_command(command),
    }
}
