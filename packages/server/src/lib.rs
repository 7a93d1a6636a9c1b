// Outbound-calling campaign orchestrator - API core
//
// This crate admits, paces, and retries outbound calls against campaigns
// and their phone numbers, tracking each call through a Postgres-backed
// state machine while Redis enforces the concurrency cap and
// duplicate-suppression window.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
