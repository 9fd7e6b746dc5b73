//! Credential command handlers
//!
//! Key generation and token encryption for repository credentials. Tokens
//! produced here are what orchestrators put in `encrypted_credential`.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use kiln_core::credential::CredentialCipher;

/// Credential subcommands
#[derive(Subcommand)]
pub enum CredentialCommands {
    /// Generate a new encryption key
    GenerateKey,
    /// Encrypt a credential with the agent's key
    Encrypt {
        /// Plaintext credential (e.g. a personal access token)
        secret: String,

        /// Encryption key
        #[arg(long, env = "KILN_ENCRYPTION_KEY", hide_env_values = true)]
        key: Option<String>,
    },
}

/// Handle credential commands
pub fn handle_credential_command(command: CredentialCommands) -> Result<()> {
    match command {
        CredentialCommands::GenerateKey => {
            println!("{}", CredentialCipher::generate_key());
            Ok(())
        }
        CredentialCommands::Encrypt { secret, key } => {
            println!("{}", encrypt(&secret, key.as_deref())?);
            Ok(())
        }
    }
}

fn encrypt(secret: &str, key: Option<&str>) -> Result<String> {
    let Some(key) = key else {
        bail!("No encryption key given. Pass --key or set KILN_ENCRYPTION_KEY");
    };
    let cipher = CredentialCipher::new(key).context("Invalid encryption key")?;
    Ok(cipher.encrypt(secret))
}
