//! Ephemeral runner daemon - Main entry point
//!
//! Provisions a GitHub Actions runner into a working directory, then serves
//! an HTTP trigger that registers and runs one ephemeral runner per request.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use runner_kit::{Provisioner, RunnerPackage};
use runnerd::config::{Config, RunnerSettings, split_credential};
use runnerd::github::{GitHubClient, MockTokenProvider, RegistrationTokenProvider};
use runnerd::orchestrator::Orchestrator;
use runnerd::server::{self, AppState};
use runnerd::shutdown::{interrupt_signal, spawn_server};

/// Ephemeral runner daemon - provisions, registers and runs a GitHub Actions runner
#[derive(Parser)]
#[command(name = "runnerd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Runner version to install (e.g. 2.300.0), or "latest"
    version: String,

    /// Runner OS: linux, osx or win
    os: String,

    /// Runner architecture: x64, arm64 or arm
    arch: String,

    /// Working directory (wiped and recreated at startup)
    work_dir: PathBuf,

    /// Repository (owner/repo) or organization to register the runner with
    repository: String,

    /// Access credential, then runner labels (comma- or whitespace-separated).
    /// The credential is omitted here when given with --credential or GITHUB_TOKEN.
    #[arg(value_name = "ARGS")]
    trailing: Vec<String>,

    /// Access credential used to request registration tokens
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    credential: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Path of the trigger route (overrides config)
    #[arg(long)]
    route: Option<String>,

    /// GitHub API base URL (overrides config)
    #[arg(long)]
    api_url: Option<String>,

    /// Base URL of runner release archives (overrides config)
    #[arg(long)]
    download_url: Option<String>,

    /// Also write logs to daily rotated files in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Dry-run mode: use fake registration tokens instead of the GitHub API
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };
    let _log_guard = init_logging(filter, cli.log_dir.as_deref())?;

    serve(cli).await
}

/// Initialize logging to stdout, plus a rotating file when `log_dir` is set.
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(filter: EnvFilter, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            // Daily rotating file, e.g. runnerd.2026-01-15.log
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("runnerd")
                .filename_suffix("log")
                .build(dir)
                .with_context(|| "Failed to create log file appender")?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false)) // stdout
        .with(file_layer)
        .init();

    if let Some(dir) = log_dir {
        info!("Logging to: {}", dir.display());
    }
    Ok(guard)
}

/// Provision the runner, then serve triggers until interrupted.
async fn serve(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen.to_string();
    }
    if let Some(route) = cli.route {
        config.server.route = route;
    }
    if let Some(api_url) = cli.api_url {
        config.github.api_url = api_url;
    }
    if let Some(download_url) = cli.download_url {
        config.github.download_url = download_url;
    }
    config.validate()?;

    let (credential, labels) = split_credential(cli.credential, cli.trailing)?;
    let settings = RunnerSettings::new(
        &cli.version,
        &cli.os,
        &cli.arch,
        cli.work_dir,
        &cli.repository,
        credential,
        &labels,
    )?;

    let http_client = reqwest::Client::builder()
        .user_agent(config.github.user_agent.as_str())
        .build()
        .context("Failed to build HTTP client")?;

    let provisioner =
        Provisioner::new(http_client.clone()).with_download_base(&config.github.download_url);
    let version = provisioner
        .resolve_version(&settings.version, &config.github.api_url)
        .await;
    let package = RunnerPackage::new(version, settings.platform, settings.arch);

    info!(
        version = %package.version,
        platform = %package.platform,
        arch = %package.arch,
        "Provisioning runner into {}",
        settings.work_dir.display()
    );
    let toolkit = provisioner
        .provision(&package, &settings.work_dir)
        .await
        .context("Failed to provision runner toolkit")?;

    // In dry-run mode, use mock tokens instead of GitHub API
    let tokens: Arc<dyn RegistrationTokenProvider> = if cli.dry_run {
        warn!("DRY-RUN MODE: Using mock token provider (fake GitHub registration tokens)");
        Arc::new(MockTokenProvider)
    } else {
        Arc::new(GitHubClient::new(
            http_client,
            &config.github.api_url,
            settings.credential.clone(),
        ))
    };

    let orchestrator = Arc::new(Orchestrator::new(
        settings.work_dir.clone(),
        settings.scope.clone(),
        settings.labels.clone(),
        Arc::new(toolkit),
        tokens,
    ));
    let app = server::router(
        AppState::new(orchestrator.clone(), &package),
        &config.server.route,
    );

    let listen_addr = config.listen_addr()?;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;

    info!(
        scope = %settings.scope,
        labels = ?settings.labels,
        "Runner daemon ready, trigger with POST {}",
        config.server.route
    );
    let handle = spawn_server(listener, app, interrupt_signal())
        .context("Failed to start control server")?;

    handle
        .wait()
        .await
        .context("Control server stopped unexpectedly")?;

    // A launch whose client went away keeps running; let it finish
    orchestrator.wait_idle().await;
    info!("Shutdown complete");
    Ok(())
}
