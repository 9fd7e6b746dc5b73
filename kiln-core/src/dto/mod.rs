//! Data Transfer Objects
//!
//! Payloads returned by the agent's auxiliary endpoints.

pub mod health;
pub mod job;
