//! Readiness polling with bounded attempts and backoff.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::models::health::HealthState;
use crate::supervisor::abort::AbortScope;
use crate::{AppError, Result};

/// Attempt ceiling used when none is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Linear backoff step used when none is configured.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// A client able to ask the supervised server whether it accepts calls.
pub trait HealthCheck: Send + Sync {
    /// Issue one readiness call. `Ok(())` means ready.
    fn check_health(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

impl<T: HealthCheck + ?Sized> HealthCheck for Arc<T> {
    fn check_health(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        (**self).check_health()
    }
}

/// Delay inserted before each health attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Wait `n × base` before attempt `n`, counting from 0.
    Linear {
        /// Step added per attempt.
        base: Duration,
    },
    /// Wait the same delay before every attempt.
    Fixed {
        /// Delay before each attempt.
        delay: Duration,
    },
}

impl BackoffPolicy {
    /// Delay before the zero-based attempt `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Linear { base } => base.saturating_mul(attempt),
            Self::Fixed { delay } => delay,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Linear {
            base: DEFAULT_BASE_DELAY,
        }
    }
}

/// Sequential readiness poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthProbe {
    backoff: BackoffPolicy,
    max_attempts: u32,
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self::new(BackoffPolicy::default(), DEFAULT_MAX_ATTEMPTS)
    }
}

impl HealthProbe {
    /// Build a probe with an explicit backoff and attempt ceiling.
    #[must_use]
    pub fn new(backoff: BackoffPolicy, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts,
        }
    }

    /// Configured attempt ceiling.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Poll `client` until it reports ready.
    ///
    /// The abort scope is checked at the top of every iteration and raced
    /// against both the backoff delay and the in-flight call. An abort
    /// during a call drops it; its result is never observed.
    ///
    /// # Errors
    ///
    /// - `AppError::Aborted(reason)`: a signal in `scope` fired.
    /// - `AppError::HealthTimeout`: `max_attempts` calls all failed.
    pub async fn wait_until_ready<C>(&self, client: &C, scope: &AbortScope) -> Result<HealthState>
    where
        C: HealthCheck + ?Sized,
    {
        let mut state = HealthState::default();
        let mut last_error: Option<AppError> = None;

        loop {
            if let Some(reason) = scope.fired() {
                return Err(AppError::Aborted(reason));
            }

            if state.attempts() >= self.max_attempts {
                let detail = last_error.map_or_else(String::new, |err| format!(" (last: {err})"));
                return Err(AppError::HealthTimeout(format!(
                    "not ready after {} attempts{detail}",
                    state.attempts()
                )));
            }

            let delay = self.backoff.delay_for(state.attempts());
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    reason = scope.first_fired() => return Err(AppError::Aborted(reason)),
                    () = tokio::time::sleep(delay) => {}
                }
            }

            state.record_attempt();
            let outcome = tokio::select! {
                biased;
                reason = scope.first_fired() => return Err(AppError::Aborted(reason)),
                outcome = client.check_health() => outcome,
            };

            match outcome {
                Ok(()) => {
                    state.mark_ready();
                    info!(attempts = state.attempts(), "health check succeeded");
                    return Ok(state);
                }
                Err(err) => {
                    debug!(attempt = state.attempts(), %err, "health check failed");
                    last_error = Some(err);
                }
            }
        }
    }
}
