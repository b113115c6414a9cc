//! HTTP control surface.
//!
//! - `POST <route>` triggers a runner launch and answers once it has finished:
//!   200 on success, 409 if a runner is active or a launch is in progress,
//!   500 if the token request or a runner phase failed. Bodies are empty.
//! - `GET /status` reports the orchestrator phase and the last trigger.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use runner_kit::RunnerPackage;
use serde::Serialize;
use tracing::{error, info};

use crate::orchestrator::{Orchestrator, OrchestratorStatus, TriggerOutcome};

/// Path of the read-only status route.
pub const STATUS_ROUTE: &str = "/status";

/// Package identity reported by the status route.
#[derive(Debug, Clone, Serialize)]
pub struct PackageInfo {
    pub version: String,
    pub os: String,
    pub arch: String,
}

impl From<&RunnerPackage> for PackageInfo {
    fn from(package: &RunnerPackage) -> Self {
        Self {
            version: package.version.clone(),
            os: package.platform.to_string(),
            arch: package.arch.to_string(),
        }
    }
}

/// Shared state for the control handlers.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    package: PackageInfo,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, package: &RunnerPackage) -> Self {
        Self {
            orchestrator,
            package: package.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    orchestrator: OrchestratorStatus,
    work_dir: PathBuf,
    package: PackageInfo,
}

/// Build the control router with the trigger mounted at `route`.
pub fn router(state: AppState, route: &str) -> Router {
    Router::new()
        .route(route, post(trigger_handler))
        .route(STATUS_ROUTE, get(status_handler))
        .with_state(state)
}

async fn trigger_handler(State(state): State<AppState>) -> StatusCode {
    let orchestrator = state.orchestrator.clone();

    // Detached so a dropped connection does not cancel a launch midway
    let result = tokio::spawn(async move { orchestrator.trigger().await }).await;

    match result {
        Ok(Ok(TriggerOutcome::Completed)) => {
            info!("Runner launch completed");
            StatusCode::OK
        }
        Ok(Ok(TriggerOutcome::Rejected(reason))) => {
            info!(%reason, "Rejected launch trigger");
            StatusCode::CONFLICT
        }
        Ok(Err(e)) => {
            error!(phase = %e.phase(), "Runner launch failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            error!("Launch task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        orchestrator: state.orchestrator.status().await,
        work_dir: state.orchestrator.work_dir().to_path_buf(),
        package: state.package.clone(),
    })
}
