//! HTTP client for a supervised agent server.
//!
//! Only the readiness call is modelled here; the served protocol itself is
//! reached through [`AgentClient::http`] and [`AgentClient::url`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::trace;

use crate::models::endpoint::AgentEndpoint;
use crate::supervisor::health::HealthCheck;
use crate::{AppError, Result};

/// Health path used when none is configured.
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Per-request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Thin HTTP client bound to one agent endpoint.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
    health_path: String,
}

impl AgentClient {
    /// Build a client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` if the underlying HTTP client cannot be built.
    pub fn new(endpoint: &AgentEndpoint, health_path: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Http(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: endpoint.base_url.clone(),
            health_path: normalize_path(health_path),
        })
    }

    /// Base URL of the agent server.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a server path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, normalize_path(path))
    }

    /// Underlying HTTP client for protocol calls.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Issue one readiness request. Any 2xx status means ready.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failure or a non-2xx status.
    pub async fn health(&self) -> Result<()> {
        let url = self.url(&self.health_path);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        trace!(%url, %status, "health response");
        if status.is_success() {
            Ok(())
        } else {
            Err(AppError::Http(format!("health check returned {status}")))
        }
    }
}

impl HealthCheck for AgentClient {
    fn check_health(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.health())
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}
