//! Supervisor configuration parsing and validation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::client::{DEFAULT_HEALTH_PATH, DEFAULT_REQUEST_TIMEOUT};
use crate::lock::LockOptions;
use crate::supervisor::coordinator::{ApiServerEnv, LaunchSpec, DEFAULT_HOST};
use crate::supervisor::health::{BackoffPolicy, HealthProbe, DEFAULT_MAX_ATTEMPTS};
use crate::supervisor::launcher::{ProcessSpec, HOST_ENV, PORT_ENV};
use crate::{AppError, Result};

/// Shape of the delay between health attempts.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// `attempt × delay_ms`, starting at zero.
    Linear,
    /// `delay_ms` before every attempt.
    Fixed,
}

/// Readiness probing settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HealthConfig {
    /// Path of the readiness endpoint.
    #[serde(default = "default_health_path")]
    pub path: String,
    /// Backoff shape.
    #[serde(default = "default_backoff")]
    pub backoff: BackoffKind,
    /// Base (linear) or constant (fixed) delay in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Attempt ceiling before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Timeout of a single health request in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            backoff: default_backoff(),
            delay_ms: default_delay_ms(),
            max_attempts: default_max_attempts(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_health_path() -> String {
    DEFAULT_HEALTH_PATH.into()
}

fn default_backoff() -> BackoffKind {
    BackoffKind::Linear
}

fn default_delay_ms() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_request_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_REQUEST_TIMEOUT.as_millis()).unwrap_or(2000)
}

/// Lock file settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LockConfig {
    /// Whether the supervisor locks `resource` before launching.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Reclaim locks held by dead processes.
    #[serde(default = "default_true")]
    pub stale_check: bool,
    /// Extra attempts against a live owner.
    #[serde(default)]
    pub retries: u32,
    /// Delay between attempts in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_check: true,
            retries: 0,
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retry_interval_ms() -> u64 {
    100
}

/// Upstream API server injected into the child environment.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ApiServerConfig {
    /// Environment variable name.
    pub var: String,
    /// URL value.
    pub url: String,
}

fn default_host() -> String {
    DEFAULT_HOST.into()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".agent-supervisor")
}

/// Supervisor configuration parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Agent server executable.
    pub command: String,
    /// Arguments for the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Extra environment for the child.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Host the child binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Resource guarded by the lock file (`<resource>.lock`).
    #[serde(default)]
    pub resource: Option<PathBuf>,
    /// Directory holding durable supervisor files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Optional upstream API server variable.
    #[serde(default)]
    pub api_server: Option<ApiServerConfig>,
    /// Readiness probing.
    #[serde(default)]
    pub health: HealthConfig,
    /// Locking behaviour.
    #[serde(default)]
    pub lock: LockConfig,
}

impl SupervisorConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Readiness probe built from `[health]`.
    #[must_use]
    pub fn probe(&self) -> HealthProbe {
        let delay = Duration::from_millis(self.health.delay_ms);
        let backoff = match self.health.backoff {
            BackoffKind::Linear => BackoffPolicy::Linear { base: delay },
            BackoffKind::Fixed => BackoffPolicy::Fixed { delay },
        };
        HealthProbe::new(backoff, self.health.max_attempts)
    }

    /// Timeout of one health request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.health.request_timeout_ms)
    }

    /// Lock acquisition options built from `[lock]`.
    #[must_use]
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            stale_check: self.lock.stale_check,
            retries: self.lock.retries,
            retry_interval: Duration::from_millis(self.lock.retry_interval_ms),
        }
    }

    /// Resource to lock, if locking is enabled and a resource is configured.
    #[must_use]
    pub fn lock_target(&self) -> Option<&Path> {
        if self.lock.enabled {
            self.resource.as_deref()
        } else {
            None
        }
    }

    /// Launch request without observers.
    #[must_use]
    pub fn launch_spec(&self) -> LaunchSpec {
        let mut process = ProcessSpec::new(&self.command).args(self.args.iter().cloned());
        process.env.clone_from(&self.env);
        process.cwd.clone_from(&self.cwd);

        let mut spec = LaunchSpec::new(process).with_probe(self.probe());
        spec.host.clone_from(&self.host);
        spec.api_server = self.api_server.as_ref().map(|api| ApiServerEnv {
            var: api.var.clone(),
            url: api.url.clone(),
        });
        spec
    }

    fn validate(&mut self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(AppError::Config("command must not be empty".into()));
        }

        if self.host.trim().is_empty() {
            return Err(AppError::Config("host must not be empty".into()));
        }

        if self.health.max_attempts == 0 {
            return Err(AppError::Config(
                "health.max_attempts must be greater than zero".into(),
            ));
        }

        if !self.health.path.starts_with('/') {
            self.health.path = format!("/{}", self.health.path);
        }

        if let Some(ref api) = self.api_server {
            if api.var.trim().is_empty() {
                return Err(AppError::Config("api_server.var must not be empty".into()));
            }
            if api.var == PORT_ENV || api.var == HOST_ENV {
                return Err(AppError::Config(format!(
                    "api_server.var must not be {PORT_ENV} or {HOST_ENV}"
                )));
            }
        }

        Ok(())
    }
}
