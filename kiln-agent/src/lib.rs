//! Kiln Agent
//!
//! Executes CI pipeline jobs in isolated containers on behalf of a remote
//! orchestrator. Each job gets a private workspace, an optional clone of its
//! repository and one container running the pipeline runner; the result is
//! returned to the caller and everything else is discarded.

pub mod api;
pub mod config;
pub mod error;
pub mod git;
pub mod podman;
pub mod runner;
pub mod runtime;
pub mod service;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;
