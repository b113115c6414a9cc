//! Runner process launch.
//!
//! The runner is started in two phases, each an external program invoked
//! from the runner directory with the daemon's stdout/stderr attached:
//!
//! 1. `config.sh` registers an ephemeral, unattended runner with the token
//! 2. `run.sh` executes the runner until its single job completes

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::package::Platform;
use crate::probe;

/// Parameters for the configuration phase.
pub struct LaunchSpec<'a> {
    /// Repository or organization URL the runner registers against
    pub url: &'a str,
    /// Short-lived registration token
    pub token: &'a str,
    /// Labels the runner advertises
    pub labels: &'a [String],
}

impl std::fmt::Debug for LaunchSpec<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchSpec")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("labels", &self.labels)
            .finish()
    }
}

impl LaunchSpec<'_> {
    /// Arguments passed to the configuration entry point.
    pub fn config_args(&self) -> Vec<String> {
        let mut args = vec![
            "--url".to_string(),
            self.url.to_string(),
            "--token".to_string(),
            self.token.to_string(),
        ];
        if !self.labels.is_empty() {
            args.push("--labels".to_string());
            args.push(self.labels.join(","));
        }
        args.extend(
            ["--disableupdate", "--replace", "--unattended", "--ephemeral"]
                .into_iter()
                .map(String::from),
        );
        args
    }
}

/// The two runner process phases.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Register the runner. Returns once the configuration program exits.
    async fn configure(&self, spec: &LaunchSpec<'_>) -> Result<()>;

    /// Run the runner. Blocks for the full duration of the job.
    async fn run(&self) -> Result<()>;

    /// Configure then run.
    async fn launch(&self, spec: &LaunchSpec<'_>) -> Result<()> {
        self.configure(spec).await?;
        self.run().await
    }
}

/// An extracted runner package on disk.
#[derive(Debug, Clone)]
pub struct Toolkit {
    dir: PathBuf,
    platform: Platform,
}

impl Toolkit {
    pub fn new(dir: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            dir: dir.into(),
            platform,
        }
    }

    pub fn config_script(&self) -> PathBuf {
        self.dir.join(self.platform.config_script())
    }

    pub fn run_script(&self) -> PathBuf {
        self.dir.join(self.platform.run_script())
    }

    /// Returns true if a runner is registered in this directory.
    pub fn is_active(&self) -> bool {
        probe::is_active(&self.dir)
    }

    async fn invoke(&self, program: &Path, args: &[String]) -> std::io::Result<ExitStatus> {
        Command::new(program)
            .args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
    }
}

#[async_trait]
impl Launcher for Toolkit {
    async fn configure(&self, spec: &LaunchSpec<'_>) -> Result<()> {
        let script = self.config_script();
        info!(
            url = %spec.url,
            labels = ?spec.labels,
            "Configuring ephemeral runner"
        );

        let status = self
            .invoke(&script, &spec.config_args())
            .await
            .map_err(|e| Error::Configure(format!("failed to start {}: {e}", script.display())))?;

        if !status.success() {
            return Err(Error::Configure(format!(
                "{} exited with {status}",
                script.display()
            )));
        }

        debug!("Runner configuration complete");
        Ok(())
    }

    async fn run(&self) -> Result<()> {
        let script = self.run_script();
        info!("Starting runner: {}", script.display());

        let status = self
            .invoke(&script, &[])
            .await
            .map_err(|e| Error::Run(format!("failed to start {}: {e}", script.display())))?;

        if !status.success() {
            return Err(Error::Run(format!("{} exited with {status}", script.display())));
        }

        info!("Runner exited successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_args() {
        let labels = vec!["self-hosted".to_string(), "linux".to_string(), "x64".to_string()];
        let spec = LaunchSpec {
            url: "https://github.com/octo/hello",
            token: "AABBCC",
            labels: &labels,
        };

        assert_eq!(
            spec.config_args(),
            vec![
                "--url",
                "https://github.com/octo/hello",
                "--token",
                "AABBCC",
                "--labels",
                "self-hosted,linux,x64",
                "--disableupdate",
                "--replace",
                "--unattended",
                "--ephemeral",
            ]
        );
    }

    #[test]
    fn test_config_args_without_labels() {
        let spec = LaunchSpec {
            url: "https://github.com/octo",
            token: "AABBCC",
            labels: &[],
        };
        let args = spec.config_args();
        assert!(!args.contains(&"--labels".to_string()));
        assert!(args.contains(&"--ephemeral".to_string()));
    }

    #[test]
    fn test_debug_redacts_token() {
        let spec = LaunchSpec {
            url: "https://github.com/octo/hello",
            token: "super-secret-token",
            labels: &[],
        };
        let rendered = format!("{spec:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_toolkit_paths() {
        let toolkit = Toolkit::new("/opt/runner", Platform::Linux);
        assert_eq!(toolkit.config_script(), PathBuf::from("/opt/runner/config.sh"));
        assert_eq!(toolkit.run_script(), PathBuf::from("/opt/runner/run.sh"));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn write_script(dir: &Path, name: &str, body: &str) {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        #[tokio::test]
        async fn test_launch_runs_both_phases() {
            let dir = TempDir::new().unwrap();
            write_script(dir.path(), "config.sh", "echo \"$@\" > args.txt\ntouch .runner");
            write_script(dir.path(), "run.sh", "touch ran.txt\nrm -f .runner");

            let toolkit = Toolkit::new(dir.path(), Platform::Linux);
            let spec = LaunchSpec {
                url: "https://github.com/octo/hello",
                token: "tok",
                labels: &["self-hosted".to_string()],
            };

            toolkit.configure(&spec).await.unwrap();
            assert!(toolkit.is_active());
            let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
            assert!(args.contains("--ephemeral"));
            assert!(args.contains("--labels self-hosted"));

            toolkit.run().await.unwrap();
            assert!(dir.path().join("ran.txt").exists());
            assert!(!toolkit.is_active());
        }

        #[tokio::test]
        async fn test_configure_failure() {
            let dir = TempDir::new().unwrap();
            write_script(dir.path(), "config.sh", "exit 3");
            write_script(dir.path(), "run.sh", "touch ran.txt");

            let toolkit = Toolkit::new(dir.path(), Platform::Linux);
            let spec = LaunchSpec {
                url: "https://github.com/octo/hello",
                token: "tok",
                labels: &[],
            };

            let err = toolkit.launch(&spec).await.unwrap_err();
            assert!(matches!(err, Error::Configure(_)));
            assert!(!dir.path().join("ran.txt").exists());
        }

        #[tokio::test]
        async fn test_run_failure() {
            let dir = TempDir::new().unwrap();
            write_script(dir.path(), "config.sh", "exit 0");
            write_script(dir.path(), "run.sh", "exit 1");

            let toolkit = Toolkit::new(dir.path(), Platform::Linux);
            let err = toolkit.run().await.unwrap_err();
            assert!(matches!(err, Error::Run(_)));
        }

        #[tokio::test]
        async fn test_missing_script() {
            let dir = TempDir::new().unwrap();
            let toolkit = Toolkit::new(dir.path(), Platform::Linux);
            let err = toolkit.run().await.unwrap_err();
            assert!(matches!(err, Error::Run(_)));
        }
    }
}
