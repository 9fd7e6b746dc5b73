//! Repository cloning
//!
//! Populates a workspace with a working copy using libgit2. A decrypted
//! credential is handed to libgit2 only through the in-memory credentials
//! callback, so it never lands in the remote URL, `.git/config` or any other
//! file of the working copy.

use git2::build::RepoBuilder;
use git2::{Cred, CredentialType, FetchOptions, RemoteCallbacks};
use kiln_core::credential::DecryptedCredential;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Error)]
pub enum CloneError {
    #[error("Failed to clone repository {url} (branch {branch}): {message}")]
    Failed {
        url: String,
        branch: String,
        message: String,
    },

    #[error("Clone of {url} completed but the repository directory is invalid")]
    Incomplete { url: String },

    #[error("Clone task for {url} did not complete: {message}")]
    Task { url: String, message: String },
}

/// Clones remotes into job workspaces
#[derive(Debug, Clone)]
pub struct RepositoryCloner {
    username: String,
}

impl RepositoryCloner {
    /// # Arguments
    /// * `username` - Username sent with a token credential (e.g. `x-access-token`)
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    /// Clones `url` at `branch` into `dest`
    ///
    /// The credential is consumed and dropped (zeroized) when the clone
    /// finishes. Failures are not retried.
    pub async fn clone_into(
        &self,
        url: &str,
        branch: &str,
        credential: Option<DecryptedCredential>,
        dest: &Path,
    ) -> Result<(), CloneError> {
        let display_url = redact_url(url);
        info!(
            "Cloning {} (branch: {}) into {}",
            display_url,
            branch,
            dest.display()
        );

        let task_url = url.to_string();
        let task_branch = branch.to_string();
        let task_dest = dest.to_path_buf();
        let username = self.username.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            let result = clone_blocking(
                &task_url,
                &task_branch,
                &username,
                credential.as_ref(),
                &task_dest,
            );
            // Scrub before the credential leaves scope
            result.map_err(|e| redact(&e.message().to_string(), &task_url, credential.as_ref()))
        })
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                return Err(CloneError::Failed {
                    url: display_url,
                    branch: branch.to_string(),
                    message,
                });
            }
            Err(e) => {
                return Err(CloneError::Task {
                    url: display_url,
                    message: e.to_string(),
                });
            }
        }

        if !dest.join(".git").is_dir() {
            return Err(CloneError::Incomplete { url: display_url });
        }

        debug!(
            "Cloned {} with {} top-level entries",
            display_url,
            count_entries(dest)
        );
        Ok(())
    }
}

fn clone_blocking(
    url: &str,
    branch: &str,
    username: &str,
    credential: Option<&DecryptedCredential>,
    dest: &Path,
) -> Result<(), git2::Error> {
    let mut callbacks = RemoteCallbacks::new();

    if let Some(credential) = credential {
        let mut offered = false;
        callbacks.credentials(move |_url, _username_from_url, allowed| {
            // libgit2 re-invokes the callback after a rejection; answer once
            if offered {
                return Err(git2::Error::from_str("credential rejected by remote"));
            }
            offered = true;

            if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                Cred::userpass_plaintext(username, credential.expose())
            } else {
                Err(git2::Error::from_str(
                    "remote does not accept token authentication",
                ))
            }
        });
    }

    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks);
    if is_network_url(url) {
        fetch.depth(1);
    }

    RepoBuilder::new()
        .branch(branch)
        .fetch_options(fetch)
        .clone(url, dest)?;

    Ok(())
}

/// Whether `url` names a network remote (shallow clones are only possible there)
pub fn is_network_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    if ["http://", "https://", "ssh://", "git://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return true;
    }

    // scp-like syntax: user@host:path
    match (url.find('@'), url.find(':')) {
        (Some(at), Some(colon)) => at < colon && !url.contains("://"),
        _ => false,
    }
}

/// Replaces URL userinfo (`user:pass@`) with a placeholder
pub fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest_start = scheme_end + 3;
    let rest = &url[rest_start..];
    let authority_end = rest.find('/').unwrap_or(rest.len());

    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}{}@{}", &url[..rest_start], REDACTED, &rest[at + 1..]),
        None => url.to_string(),
    }
}

/// Removes the credential and any URL userinfo from an error message
fn redact(message: &str, url: &str, credential: Option<&DecryptedCredential>) -> String {
    let mut message = message.replace(url, &redact_url(url));
    if let Some(credential) = credential {
        if !credential.is_empty() {
            message = message.replace(credential.expose(), REDACTED);
        }
    }
    message
}

fn count_entries(path: &Path) -> usize {
    std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
}
