//! Kiln Core
//!
//! Core types shared by the Kiln agent, client and CLI.
//!
//! This crate contains:
//! - Domain types: job requests and results exchanged with the agent
//! - DTOs: auxiliary API payloads (health, service info, async acceptance)
//! - Credential cipher: Fernet encryption shared with credential issuers

pub mod credential;
pub mod domain;
pub mod dto;
