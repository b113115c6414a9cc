//! Runner activity detection.
//!
//! The runner writes a `.runner` file into its directory while it is
//! registered and removes it when an ephemeral runner deregisters. Its
//! presence is the only signal consulted.

use std::path::{Path, PathBuf};

/// Marker file written by the runner's configuration phase.
pub const MARKER_FILE: &str = ".runner";

/// Path of the marker file inside `work_dir`.
pub fn marker_path(work_dir: &Path) -> PathBuf {
    work_dir.join(MARKER_FILE)
}

/// Returns true if a runner currently owns `work_dir`.
pub fn is_active(work_dir: &Path) -> bool {
    marker_path(work_dir).exists()
}
