//! GitHub Actions runner package identity and download URL construction.
//!
//! A [`RunnerPackage`] is the `(version, platform, arch)` tuple that names one
//! release archive of the runner. It is fixed for the lifetime of the daemon.

use std::fmt;
use std::str::FromStr;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Error;

/// Fallback GitHub Actions runner version if the `latest` lookup fails.
pub const FALLBACK_VERSION: &str = "2.321.0";

/// Default location of runner release archives.
pub const DEFAULT_DOWNLOAD_BASE: &str = "https://github.com/actions/runner/releases/download";

/// Target platform for the GitHub Actions runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
    MacOS,
}

impl Platform {
    /// Get the platform string used in GitHub runner download URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "win",
            Platform::MacOS => "osx",
        }
    }

    /// Get the file extension for the runner archive.
    pub fn extension(&self) -> &'static str {
        match self {
            Platform::Linux | Platform::MacOS => "tar.gz",
            Platform::Windows => "zip",
        }
    }

    /// Name of the configuration entry point at the root of the runner directory.
    pub fn config_script(&self) -> &'static str {
        match self {
            Platform::Linux | Platform::MacOS => "config.sh",
            Platform::Windows => "config.cmd",
        }
    }

    /// Name of the run entry point at the root of the runner directory.
    pub fn run_script(&self) -> &'static str {
        match self {
            Platform::Linux | Platform::MacOS => "run.sh",
            Platform::Windows => "run.cmd",
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Platform::Linux),
            "osx" | "macos" | "darwin" => Ok(Platform::MacOS),
            "win" | "windows" => Ok(Platform::Windows),
            other => Err(Error::UnknownPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target architecture for the GitHub Actions runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    Arm64,
    Arm,
}

impl Arch {
    /// Get the architecture string used in GitHub runner download URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
            Arch::Arm => "arm",
        }
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accepts the runner's own names and the usual `uname -m` spellings
        match s.trim().to_ascii_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Ok(Arch::X64),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            "arm" | "armv7l" | "armv6l" => Ok(Arch::Arm),
            other => Err(Error::UnknownArch(other.to_string())),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one runner release archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerPackage {
    pub version: String,
    pub platform: Platform,
    pub arch: Arch,
}

impl RunnerPackage {
    pub fn new(version: impl Into<String>, platform: Platform, arch: Arch) -> Self {
        let version: String = version.into();
        Self {
            version: version.trim_start_matches('v').to_string(),
            platform,
            arch,
        }
    }

    /// Local file name of the release archive, e.g. `actions-runner-linux-x64-2.321.0.tar.gz`.
    pub fn archive_name(&self) -> String {
        format!(
            "actions-runner-{platform}-{arch}-{version}.{ext}",
            platform = self.platform.as_str(),
            arch = self.arch.as_str(),
            version = self.version,
            ext = self.platform.extension(),
        )
    }

    /// Download URL of the release archive under `base`.
    ///
    /// # Example
    /// ```
    /// use runner_kit::package::{Arch, Platform, RunnerPackage, DEFAULT_DOWNLOAD_BASE};
    ///
    /// let package = RunnerPackage::new("2.321.0", Platform::Linux, Arch::X64);
    /// assert_eq!(
    ///     package.download_url(DEFAULT_DOWNLOAD_BASE),
    ///     "https://github.com/actions/runner/releases/download/v2.321.0/actions-runner-linux-x64-2.321.0.tar.gz"
    /// );
    /// ```
    pub fn download_url(&self, base: &str) -> String {
        format!(
            "{base}/v{version}/{name}",
            base = base.trim_end_matches('/'),
            version = self.version,
            name = self.archive_name(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

/// Fetch the latest GitHub Actions runner version from the GitHub API.
///
/// Returns `None` if the fetch fails (caller should fall back to `FALLBACK_VERSION`).
pub async fn fetch_latest_version(client: &Client, api_url: &str) -> Option<String> {
    let url = format!(
        "{}/repos/actions/runner/releases/latest",
        api_url.trim_end_matches('/')
    );

    debug!("Fetching latest runner version from {}", url);

    let response = client
        .get(&url)
        .header("Accept", "application/vnd.github+json")
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        debug!(
            "Failed to fetch latest runner version ({})",
            response.status()
        );
        return None;
    }

    let release: LatestRelease = response.json().await.ok()?;
    let version = release.tag_name.trim_start_matches('v').to_string();
    if version.is_empty() {
        return None;
    }

    info!("Latest GitHub Actions runner version: v{}", version);
    Some(version)
}
