//! Runner lifecycle orchestration.
//!
//! A trigger runs lock → probe → token → configure → run. The launch lock
//! is taken with `try_lock` and held until the run phase exits, so at most
//! one trigger is past the probe at any time and a contending trigger is
//! rejected immediately instead of queueing behind the running job.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use runner_kit::{LaunchSpec, Launcher, probe};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::RunnerScope;
use crate::github::{RegistrationTokenProvider, TokenError};

/// Where the current trigger (if any) is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    RequestingToken,
    Configuring,
    Running,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::RequestingToken => "requesting_token",
            Phase::Configuring => "configuring",
            Phase::Running => "running",
        };
        f.write_str(s)
    }
}

/// Why a trigger was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Another trigger holds the launch lock
    LaunchInProgress,
    /// The working directory carries a runner marker
    RunnerActive,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::LaunchInProgress => f.write_str("launch already in progress"),
            RejectReason::RunnerActive => f.write_str("runner already active"),
        }
    }
}

/// Result of a trigger that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The runner was configured and ran to completion
    Completed,
    /// Nothing was launched
    Rejected(RejectReason),
}

/// A trigger that failed, tagged with the phase it failed in.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("registration token request failed: {0}")]
    Token(#[from] TokenError),

    #[error("{0}")]
    Configure(#[source] runner_kit::Error),

    #[error("{0}")]
    Run(#[source] runner_kit::Error),
}

impl TriggerError {
    /// The phase that was active when the error occurred.
    pub fn phase(&self) -> Phase {
        match self {
            TriggerError::Token(_) => Phase::RequestingToken,
            TriggerError::Configure(_) => Phase::Configuring,
            TriggerError::Run(_) => Phase::Running,
        }
    }
}

/// Outcome recorded for the status route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedOutcome {
    Succeeded,
    Rejected,
    Failed,
}

/// The last finished trigger.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerRecord {
    pub outcome: RecordedOutcome,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub phase: Phase,
    pub runner_active: bool,
    pub last_trigger: Option<TriggerRecord>,
}

/// Sequences runner launches for one working directory.
pub struct Orchestrator {
    work_dir: PathBuf,
    scope: RunnerScope,
    labels: Vec<String>,
    launcher: Arc<dyn Launcher>,
    tokens: Arc<dyn RegistrationTokenProvider>,
    /// Held for the whole of a launch
    launch_lock: Mutex<()>,
    phase: RwLock<Phase>,
    last_trigger: RwLock<Option<TriggerRecord>>,
}

impl Orchestrator {
    pub fn new(
        work_dir: PathBuf,
        scope: RunnerScope,
        labels: Vec<String>,
        launcher: Arc<dyn Launcher>,
        tokens: Arc<dyn RegistrationTokenProvider>,
    ) -> Self {
        Self {
            work_dir,
            scope,
            labels,
            launcher,
            tokens,
            launch_lock: Mutex::new(()),
            phase: RwLock::new(Phase::Idle),
            last_trigger: RwLock::new(None),
        }
    }

    /// Handle one launch trigger.
    ///
    /// Returns once the runner's run phase has exited, or immediately if the
    /// trigger is rejected. A rejected trigger never contacts GitHub.
    pub async fn trigger(&self) -> Result<TriggerOutcome, TriggerError> {
        let Ok(_guard) = self.launch_lock.try_lock() else {
            debug!("Launch lock is held, rejecting trigger");
            return Ok(self.reject(RejectReason::LaunchInProgress).await);
        };

        if probe::is_active(&self.work_dir) {
            debug!(
                "Runner marker present in {}, rejecting trigger",
                self.work_dir.display()
            );
            return Ok(self.reject(RejectReason::RunnerActive).await);
        }

        let result = self.launch().await;
        self.set_phase(Phase::Idle).await;

        match &result {
            Ok(()) => self.record(RecordedOutcome::Succeeded, None).await,
            Err(e) => self.record(RecordedOutcome::Failed, Some(e.to_string())).await,
        }

        result.map(|()| TriggerOutcome::Completed)
    }

    async fn launch(&self) -> Result<(), TriggerError> {
        self.set_phase(Phase::RequestingToken).await;
        let token = self.tokens.registration_token(&self.scope).await?;

        self.set_phase(Phase::Configuring).await;
        let url = self.scope.to_url();
        let spec = LaunchSpec {
            url: &url,
            token: &token.token,
            labels: &self.labels,
        };
        self.launcher
            .configure(&spec)
            .await
            .map_err(TriggerError::Configure)?;

        self.set_phase(Phase::Running).await;
        info!(scope = %self.scope, "Runner registered, waiting for job to finish");
        self.launcher.run().await.map_err(TriggerError::Run)?;

        Ok(())
    }

    async fn reject(&self, reason: RejectReason) -> TriggerOutcome {
        self.record(RecordedOutcome::Rejected, Some(reason.to_string()))
            .await;
        TriggerOutcome::Rejected(reason)
    }

    async fn set_phase(&self, phase: Phase) {
        *self.phase.write().await = phase;
    }

    async fn record(&self, outcome: RecordedOutcome, error: Option<String>) {
        *self.last_trigger.write().await = Some(TriggerRecord {
            outcome,
            error,
            finished_at: Utc::now(),
        });
    }

    /// Current phase, runner marker state and last trigger.
    ///
    /// Never takes the launch lock.
    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            phase: *self.phase.read().await,
            runner_active: probe::is_active(&self.work_dir),
            last_trigger: self.last_trigger.read().await.clone(),
        }
    }

    /// Wait until no launch is in progress.
    pub async fn wait_idle(&self) {
        let _guard = self.launch_lock.lock().await;
    }

    pub fn work_dir(&self) -> &std::path::Path {
        &self.work_dir
    }
}
