//! Toolkit for running an ephemeral GitHub Actions runner from a local directory.
//!
//! This crate provides the pieces the runner daemon composes:
//! - Runner package identity and download URL construction
//! - Streaming archive download and in-place extraction
//! - Detection of an active runner registration via its marker file
//! - Launching the runner's configure and run phases

mod download;
mod error;
pub mod launcher;
pub mod package;
pub mod probe;
pub mod provision;

pub use download::download_file;
pub use error::{Error, Result};
pub use launcher::{LaunchSpec, Launcher, Toolkit};
pub use package::{Arch, Platform, RunnerPackage};
pub use provision::Provisioner;
