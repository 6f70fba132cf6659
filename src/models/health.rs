//! Readiness polling state.

/// Progress of a health probe.
///
/// Owned and mutated only by the probe. `attempts` never decreases and
/// `ready` never reverts once set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthState {
    attempts: u32,
    ready: bool,
}

impl HealthState {
    /// Number of health calls issued so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a health call has succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub(crate) fn mark_ready(&mut self) {
        self.ready = true;
    }
}
