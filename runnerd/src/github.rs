//! GitHub API client for runner registration tokens.
//!
//! Exchanges the long-lived access credential for a short-lived runner
//! registration token, one remote call per launch attempt. Neither the
//! credential nor the token is ever logged.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::RunnerScope;

/// GitHub API base URL
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Long-lived access credential used to mint registration tokens.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Response from runner registration token endpoint
#[derive(Clone, Deserialize)]
pub struct RegistrationToken {
    pub token: String,
    pub expires_at: String,
}

impl std::fmt::Debug for RegistrationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Registration token acquisition failure.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The credential was rejected (401/403).
    #[error("GitHub rejected the credential ({status}): {body}")]
    Auth { status: StatusCode, body: String },

    /// Any other non-success status.
    #[error("GitHub API error getting registration token ({status}): {body}")]
    Api { status: StatusCode, body: String },

    /// Transport failure.
    #[error("Failed to request runner registration token: {0}")]
    Network(#[source] reqwest::Error),

    /// The response body was not a registration token.
    #[error("Failed to parse registration token response: {0}")]
    Malformed(String),
}

/// Trait for obtaining runner registration tokens.
///
/// This abstracts the token source so we can use either:
/// - Real GitHub API (production)
/// - Mock tokens (dry-run/testing)
#[async_trait]
pub trait RegistrationTokenProvider: Send + Sync {
    /// Get a registration token for the given runner scope.
    async fn registration_token(&self, scope: &RunnerScope) -> Result<RegistrationToken, TokenError>;
}

/// Mock token provider for dry-run mode.
///
/// Returns fake tokens that won't work with GitHub but allow exercising
/// the runner toolkit without API access.
pub struct MockTokenProvider;

#[async_trait]
impl RegistrationTokenProvider for MockTokenProvider {
    async fn registration_token(&self, scope: &RunnerScope) -> Result<RegistrationToken, TokenError> {
        info!("DRY-RUN: Generated fake registration token for {}", scope);
        Ok(RegistrationToken {
            token: format!("dry-run-token-{}", &uuid::Uuid::new_v4().to_string()[..8]),
            expires_at: (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
        })
    }
}

/// GitHub API client authenticated with a bearer credential.
pub struct GitHubClient {
    api_url: String,
    credential: Credential,
    http_client: Client,
}

impl GitHubClient {
    pub fn new(http_client: Client, api_url: impl Into<String>, credential: Credential) -> Self {
        let api_url: String = api_url.into();
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            credential,
            http_client,
        }
    }

    /// Get a runner registration token for the given scope.
    ///
    /// Issues exactly one request; there is no caching and no retry.
    pub async fn registration_token(
        &self,
        scope: &RunnerScope,
    ) -> Result<RegistrationToken, TokenError> {
        let url = format!("{}{}", self.api_url, scope.registration_token_path());
        debug!("Requesting registration token for {}", scope);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.credential.expose()))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await
            .map_err(TokenError::Network)?;

        let status = response.status();
        let body = response.text().await.map_err(TokenError::Network)?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TokenError::Auth { status, body });
        }
        if !status.is_success() {
            return Err(TokenError::Api { status, body });
        }

        let token: RegistrationToken =
            serde_json::from_str(&body).map_err(|e| TokenError::Malformed(e.to_string()))?;
        if token.token.is_empty() {
            return Err(TokenError::Malformed("empty token".to_string()));
        }

        debug!(expires_at = %token.expires_at, "Obtained registration token for {}", scope);
        Ok(token)
    }
}

#[async_trait]
impl RegistrationTokenProvider for GitHubClient {
    async fn registration_token(&self, scope: &RunnerScope) -> Result<RegistrationToken, TokenError> {
        // Delegate to the inherent method
        GitHubClient::registration_token(self, scope).await
    }
}
