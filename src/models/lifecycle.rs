//! Lifecycle states of one launch request.

use serde::{Deserialize, Serialize};

/// State of a launch request as it moves through startup and runtime.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Nothing started yet.
    #[default]
    Idle,
    /// Port allocated and child being spawned.
    Launching,
    /// Child spawned; health probe running.
    AwaitingHealth,
    /// Health probe succeeded.
    Ready,
    /// Handle handed to the caller; exit notifications active.
    Running,
    /// Child terminated on its own after `Running`.
    Exited,
    /// Caller abort or dispose tore the child down.
    Aborted,
    /// Health probe exhausted its attempt ceiling.
    TimedOut,
    /// Child failed to start or died before readiness.
    FailedStartup,
}

impl LifecycleState {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Exited | Self::Aborted | Self::TimedOut | Self::FailedStartup
        )
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if next == Self::Aborted {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::Idle, Self::Launching)
                | (Self::Idle | Self::Launching, Self::FailedStartup)
                | (Self::Launching, Self::AwaitingHealth)
                | (Self::AwaitingHealth, Self::Ready | Self::TimedOut | Self::FailedStartup)
                | (Self::Ready, Self::Running)
                | (Self::Running, Self::Exited)
        )
    }
}
