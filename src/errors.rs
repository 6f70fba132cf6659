//! Error types shared across the supervisor.

use std::fmt::{Display, Formatter};

/// Shared supervisor result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Supervisor error enumeration covering every startup and locking failure.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Lock acquisition exhausted its retries against a live owner.
    Locked(String),
    /// Release attempted without holding the lock.
    NotAcquired(String),
    /// The child never became ready within the attempt ceiling.
    HealthTimeout(String),
    /// The OS failed to start the child or lost it before readiness.
    Process(String),
    /// Caller-initiated cancellation; carries the abort reason.
    Aborted(String),
    /// HTTP request to the supervised server failed.
    Http(String),
    /// The sequential task queue is closed.
    Queue(String),
}

impl AppError {
    /// Whether this error is the outcome of a deliberate abort rather than
    /// a failure.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Locked(msg) => write!(f, "locked: {msg}"),
            Self::NotAcquired(msg) => write!(f, "not acquired: {msg}"),
            Self::HealthTimeout(msg) => write!(f, "health timeout: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Aborted(reason) => write!(f, "aborted: {reason}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
            Self::Queue(msg) => write!(f, "queue: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
