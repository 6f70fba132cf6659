//! Child process exit state.

use std::fmt::{Display, Formatter};

/// Exit state of a supervised child.
///
/// Transitions exactly once from `Running` to one of the terminal variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitState {
    /// The child has not exited yet.
    Running,
    /// The child terminated on its own.
    Exited {
        /// Exit code, absent when terminated by a signal.
        code: Option<i32>,
        /// Terminating signal number (unix only).
        signal: Option<i32>,
    },
    /// The child was killed because an abort signal fired.
    Aborted {
        /// Reason carried by the abort signal.
        reason: String,
    },
}

impl ExitState {
    /// Whether the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Build an `Exited` state from an OS exit status.
    #[must_use]
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self::Exited {
            code: status.code(),
            signal,
        }
    }
}

impl Display for ExitState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited {
                code: Some(code), ..
            } => write!(f, "exited with code {code}"),
            Self::Exited {
                code: None,
                signal: Some(signal),
            } => write!(f, "terminated by signal {signal}"),
            Self::Exited {
                code: None,
                signal: None,
            } => write!(f, "exited with unknown status"),
            Self::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}
