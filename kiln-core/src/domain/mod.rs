//! Core domain types
//!
//! The structures here cross the wire between callers and the agent.
//! They carry no execution logic; the agent owns that.

pub mod job;
