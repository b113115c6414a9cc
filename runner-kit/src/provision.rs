//! Runner package provisioning.
//!
//! Materializes a runner toolkit in a working directory:
//! - Reset the directory (remove recursively, recreate)
//! - Download the release archive into it
//! - Extract the archive in place with `tar`

use std::path::Path;
use std::process::Stdio;

use reqwest::Client;
use tokio::process::Command;
use tracing::{info, warn};

use crate::download::download_file;
use crate::error::{Error, Result};
use crate::launcher::Toolkit;
use crate::package::{self, DEFAULT_DOWNLOAD_BASE, FALLBACK_VERSION, Platform, RunnerPackage};

/// Downloads and extracts runner packages.
#[derive(Debug, Clone)]
pub struct Provisioner {
    http_client: Client,
    download_base: String,
}

impl Provisioner {
    pub fn new(http_client: Client) -> Self {
        Self {
            http_client,
            download_base: DEFAULT_DOWNLOAD_BASE.to_string(),
        }
    }

    /// Override the base URL release archives are fetched from.
    pub fn with_download_base(mut self, base: impl Into<String>) -> Self {
        self.download_base = base.into();
        self
    }

    /// Resolve `latest` to a concrete version via the GitHub API.
    ///
    /// Any other version string is returned unchanged.
    pub async fn resolve_version(&self, version: &str, api_url: &str) -> String {
        if !version.eq_ignore_ascii_case("latest") {
            return version.to_string();
        }

        match package::fetch_latest_version(&self.http_client, api_url).await {
            Some(v) => v,
            None => {
                warn!(
                    "Could not resolve latest runner version, falling back to {}",
                    FALLBACK_VERSION
                );
                FALLBACK_VERSION.to_string()
            }
        }
    }

    /// Provision `package` into `work_dir`, destroying anything already there.
    pub async fn provision(&self, package: &RunnerPackage, work_dir: &Path) -> Result<Toolkit> {
        reset_dir(work_dir).await?;

        let archive = work_dir.join(package.archive_name());
        let url = package.download_url(&self.download_base);
        download_file(&self.http_client, &url, &archive).await?;

        extract(&archive, work_dir, package.platform).await?;

        let toolkit = Toolkit::new(work_dir, package.platform);
        if !toolkit.config_script().exists() {
            return Err(Error::Extract(format!(
                "archive did not contain {}",
                package.platform.config_script()
            )));
        }

        info!(
            version = %package.version,
            platform = %package.platform,
            arch = %package.arch,
            "Runner toolkit ready in {}",
            work_dir.display()
        );
        Ok(toolkit)
    }
}

/// Remove `dir` if it exists and recreate it empty.
async fn reset_dir(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await? {
        info!("Removing existing working directory {}", dir.display());
        tokio::fs::remove_dir_all(dir).await?;
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

/// Extract `archive` into `dest` using the system `tar`.
async fn extract(archive: &Path, dest: &Path, platform: Platform) -> Result<()> {
    // bsdtar (the default tar on Windows) reads zip archives with plain `xf`
    let mode = match platform {
        Platform::Windows => "xf",
        Platform::Linux | Platform::MacOS => "xzf",
    };

    info!("Extracting {}", archive.display());

    let status = Command::new("tar")
        .arg(mode)
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| Error::Extract(format!("failed to run tar: {e}")))?;

    if !status.success() {
        return Err(Error::Extract(format!("tar exited with {status}")));
    }

    Ok(())
}
