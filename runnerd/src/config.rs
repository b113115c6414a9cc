//! Configuration for the runner daemon.
//!
//! Two kinds of settings are combined at startup:
//!
//! - [`RunnerSettings`]: what to run, taken from the positional command-line
//!   arguments (version, OS, arch, working directory, repository, credential, labels)
//! - [`Config`]: how to run it, loaded with figment from an optional TOML file
//!   and environment variables, then overridden by command-line flags
//!
//! # Configuration Sources (in order of priority, lowest to highest)
//!
//! 1. Default values (from `#[serde(default)]` attributes)
//! 2. TOML config file (if provided and present)
//! 3. Environment variables (prefix: `RUNNERD_`, nested with `__`)
//!
//! - `RUNNERD_SERVER__LISTEN_ADDR` → `server.listen_addr`
//! - `RUNNERD_SERVER__ROUTE` → `server.route`
//! - `RUNNERD_GITHUB__API_URL` → `github.api_url`
//! - `RUNNERD_GITHUB__DOWNLOAD_URL` → `github.download_url`

use anyhow::{Context, Result, anyhow, bail};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use runner_kit::{Arch, Platform};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::github::Credential;

/// Daemon settings loaded from file and environment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
}

/// HTTP control server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen on (default: "0.0.0.0:8080")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path of the launch trigger route (default: "/run")
    #[serde(default = "default_route")]
    pub route: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_route() -> String {
    "/run".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            route: default_route(),
        }
    }
}

/// GitHub endpoints used for token issuance and package download.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// REST API base URL (default: "https://api.github.com")
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL of runner release archives
    #[serde(default = "default_download_url")]
    pub download_url: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_url() -> String {
    crate::github::GITHUB_API_URL.to_string()
}

fn default_download_url() -> String {
    runner_kit::package::DEFAULT_DOWNLOAD_BASE.to_string()
}

fn default_user_agent() -> String {
    concat!("runnerd/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            download_url: default_download_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file and `RUNNERD_` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = path {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("RUNNERD_").split("__"));

        figment
            .extract()
            .context("Failed to load configuration from file and environment")
    }

    /// Parse the configured listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address: {}", self.server.listen_addr))
    }

    /// Validate settings that serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        let route = &self.server.route;
        if !route.starts_with('/') {
            bail!("Trigger route must start with '/': {route}");
        }
        if route == crate::server::STATUS_ROUTE {
            bail!("Trigger route {route} collides with the status route");
        }
        Ok(())
    }
}

/// GitHub runner registration scope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RunnerScope {
    /// Organization-level runner
    Organization { name: String },

    /// Repository-level runner
    Repository { owner: String, repo: String },
}

impl RunnerScope {
    /// Get the URL the runner registers against
    pub fn to_url(&self) -> String {
        match self {
            RunnerScope::Organization { name } => {
                format!("https://github.com/{}", name)
            }
            RunnerScope::Repository { owner, repo } => {
                format!("https://github.com/{}/{}", owner, repo)
            }
        }
    }

    /// Get the API path for getting registration token
    pub fn registration_token_path(&self) -> String {
        match self {
            RunnerScope::Organization { name } => {
                format!("/orgs/{}/actions/runners/registration-token", name)
            }
            RunnerScope::Repository { owner, repo } => {
                format!(
                    "/repos/{}/{}/actions/runners/registration-token",
                    owner, repo
                )
            }
        }
    }
}

impl FromStr for RunnerScope {
    type Err = anyhow::Error;

    /// Parse `owner/repo` (repository scope) or `org` (organization scope).
    ///
    /// A leading `https://github.com/` and a trailing `.git` are accepted.
    /// Every `/`-separated segment must be non-empty.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches("https://github.com/");
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

        let parts: Vec<&str> = trimmed.split('/').collect();
        let valid = |p: &&str| {
            !p.is_empty()
                && p.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };

        match parts.as_slice() {
            [name] if valid(name) => Ok(RunnerScope::Organization {
                name: name.to_string(),
            }),
            [owner, repo] if valid(owner) && valid(repo) => Ok(RunnerScope::Repository {
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            _ => Err(anyhow!(
                "Invalid repository '{s}': expected 'owner/repo' or an organization name"
            )),
        }
    }
}

impl std::fmt::Display for RunnerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerScope::Organization { name } => write!(f, "{name}"),
            RunnerScope::Repository { owner, repo } => write!(f, "{owner}/{repo}"),
        }
    }
}

/// What the daemon provisions and registers, fixed for its lifetime.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Runner version, or "latest"
    pub version: String,
    pub platform: Platform,
    pub arch: Arch,
    /// Working directory, exclusively owned by this daemon
    pub work_dir: PathBuf,
    pub scope: RunnerScope,
    pub credential: Credential,
    pub labels: Vec<String>,
}

impl RunnerSettings {
    /// Validate the positional startup arguments.
    pub fn new(
        version: &str,
        os: &str,
        arch: &str,
        work_dir: PathBuf,
        repository: &str,
        credential: String,
        labels: &[String],
    ) -> Result<Self> {
        let version = version.trim();
        if version.is_empty() {
            bail!("Runner version must not be empty");
        }
        if work_dir.as_os_str().is_empty() {
            bail!("Working directory must not be empty");
        }
        if credential.trim().is_empty() {
            bail!("Access credential must not be empty");
        }

        Ok(Self {
            version: version.to_string(),
            platform: os.parse()?,
            arch: arch.parse()?,
            work_dir,
            scope: repository.parse()?,
            credential: Credential::new(credential.trim()),
            labels: parse_labels(labels),
        })
    }
}

/// Separate the credential from the arguments that follow REPOSITORY.
///
/// A credential given with `--credential` or `GITHUB_TOKEN` makes every
/// trailing argument a label. Otherwise the first trailing argument is the
/// credential.
pub fn split_credential(
    named: Option<String>,
    mut trailing: Vec<String>,
) -> Result<(String, Vec<String>)> {
    if let Some(credential) = named {
        return Ok((credential, trailing));
    }
    if trailing.is_empty() {
        bail!("Missing access credential: pass it after REPOSITORY, with --credential or in GITHUB_TOKEN");
    }
    let credential = trailing.remove(0);
    Ok((credential, trailing))
}

/// Split label arguments on commas and whitespace.
///
/// Empty entries are dropped and duplicates (case-insensitive) keep their
/// first occurrence.
pub fn parse_labels(raw: &[String]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for label in raw
        .iter()
        .flat_map(|arg| arg.split(|c: char| c == ',' || c.is_whitespace()))
        .map(str::trim)
        .filter(|l| !l.is_empty())
    {
        if !labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
            labels.push(label.to_string());
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Toml as TomlProvider;

    fn parse_config(toml_str: &str) -> Config {
        Figment::new()
            .merge(TomlProvider::string(toml_str))
            .extract()
            .expect("Failed to parse test config")
    }

    #[test]
    fn test_defaults() {
        let config = parse_config("");
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.server.route, "/run");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert!(config.github.user_agent.starts_with("runnerd/"));
        assert_eq!(config.listen_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_parse_config() {
        let config = parse_config(
            r#"
[server]
listen_addr = "127.0.0.1:9090"
route = "/setup"

[github]
api_url = "https://github.example.com/api/v3"
"#,
        );
        assert_eq!(config.server.route, "/setup");
        assert_eq!(config.listen_addr().unwrap().port(), 9090);
        assert_eq!(config.github.api_url, "https://github.example.com/api/v3");
        assert_eq!(
            config.github.download_url,
            "https://github.com/actions/runner/releases/download"
        );
    }

    #[test]
    fn test_invalid_listen_addr() {
        let config = parse_config("[server]\nlisten_addr = \"not an address\"\n");
        assert!(config.listen_addr().is_err());
    }

    #[test]
    fn test_validate_route() {
        assert!(parse_config("").validate().is_ok());
        assert!(parse_config("[server]\nroute = \"run\"\n").validate().is_err());
        assert!(parse_config("[server]\nroute = \"/status\"\n").validate().is_err());
        assert!(parse_config("[server]\nlisten_addr = \"nope\"\n").validate().is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::load(Some(Path::new("/nonexistent/runnerd.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_runner_scope_parse() {
        assert_eq!(
            "octo/hello-world".parse::<RunnerScope>().unwrap(),
            RunnerScope::Repository {
                owner: "octo".into(),
                repo: "hello-world".into()
            }
        );
        assert_eq!(
            "https://github.com/octo/hello.git".parse::<RunnerScope>().unwrap(),
            RunnerScope::Repository {
                owner: "octo".into(),
                repo: "hello".into()
            }
        );
        assert_eq!(
            "my-org".parse::<RunnerScope>().unwrap(),
            RunnerScope::Organization {
                name: "my-org".into()
            }
        );
        assert!("".parse::<RunnerScope>().is_err());
        assert!("a/b/c".parse::<RunnerScope>().is_err());
        assert!("owner/".parse::<RunnerScope>().is_err());
        assert!("own er/repo".parse::<RunnerScope>().is_err());
    }

    #[test]
    fn test_runner_scope_rejects_empty_repo_segment() {
        // An empty repo part must not fall back to organization scope
        for input in ["octo/", "/hello", "octo//hello", "https://github.com/octo/", "octo/hello/"] {
            assert!(
                input.parse::<RunnerScope>().is_err(),
                "{input:?} should be rejected"
            );
        }
        assert!(matches!(
            "https://github.com/octo/hello".parse::<RunnerScope>().unwrap(),
            RunnerScope::Repository { .. }
        ));
    }

    #[test]
    fn test_runner_scope_urls() {
        let repo: RunnerScope = "octo/hello".parse().unwrap();
        assert_eq!(repo.to_url(), "https://github.com/octo/hello");
        assert_eq!(
            repo.registration_token_path(),
            "/repos/octo/hello/actions/runners/registration-token"
        );
        assert_eq!(repo.to_string(), "octo/hello");

        let org: RunnerScope = "my-org".parse().unwrap();
        assert_eq!(org.to_url(), "https://github.com/my-org");
        assert_eq!(
            org.registration_token_path(),
            "/orgs/my-org/actions/runners/registration-token"
        );
    }

    #[test]
    fn test_parse_labels() {
        let raw = vec!["self-hosted,linux x64".to_string()];
        assert_eq!(parse_labels(&raw), vec!["self-hosted", "linux", "x64"]);

        let raw = vec![
            "self-hosted,".to_string(),
            " Linux ".to_string(),
            "linux,gpu".to_string(),
        ];
        assert_eq!(parse_labels(&raw), vec!["self-hosted", "Linux", "gpu"]);

        assert!(parse_labels(&[]).is_empty());
        assert!(parse_labels(&[", ,".to_string()]).is_empty());
    }

    #[test]
    fn test_split_credential_positional() {
        let (credential, labels) = split_credential(
            None,
            vec!["ghp_secret".to_string(), "self-hosted,linux".to_string()],
        )
        .unwrap();
        assert_eq!(credential, "ghp_secret");
        assert_eq!(labels, vec!["self-hosted,linux"]);

        assert!(split_credential(None, vec![]).is_err());
    }

    #[test]
    fn test_split_credential_named_keeps_all_labels() {
        let (credential, labels) = split_credential(
            Some("ghp_from_env".to_string()),
            vec!["self-hosted".to_string(), "linux".to_string()],
        )
        .unwrap();
        assert_eq!(credential, "ghp_from_env");
        assert_eq!(labels, vec!["self-hosted", "linux"]);
    }

    #[test]
    fn test_runner_settings() {
        let settings = RunnerSettings::new(
            "2.300.0",
            "linux",
            "x64",
            PathBuf::from("/tmp/runner"),
            "octo/hello",
            "ghp_secret".to_string(),
            &["self-hosted,linux,x64".to_string()],
        )
        .unwrap();

        assert_eq!(settings.platform, Platform::Linux);
        assert_eq!(settings.arch, Arch::X64);
        assert_eq!(settings.labels.len(), 3);
        assert!(!format!("{settings:?}").contains("ghp_secret"));
    }

    #[test]
    fn test_runner_settings_rejects_bad_input() {
        let bad = |version: &str, os: &str, arch: &str, repo: &str, cred: &str| {
            RunnerSettings::new(
                version,
                os,
                arch,
                PathBuf::from("/tmp/runner"),
                repo,
                cred.to_string(),
                &[],
            )
            .is_err()
        };

        assert!(bad("", "linux", "x64", "octo/hello", "tok"));
        assert!(bad("2.300.0", "beos", "x64", "octo/hello", "tok"));
        assert!(bad("2.300.0", "linux", "sparc", "octo/hello", "tok"));
        assert!(bad("2.300.0", "linux", "x64", "a/b/c", "tok"));
        assert!(bad("2.300.0", "linux", "x64", "octo/hello", "  "));
    }
}
