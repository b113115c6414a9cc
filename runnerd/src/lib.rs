//! Ephemeral runner lifecycle daemon library
//!
//! This library provides the core functionality for the runner daemon.
//! The binary entry point is in main.rs.

pub mod config;
pub mod github;
pub mod orchestrator;
pub mod server;
pub mod shutdown;
