//! Cancellation signals carrying a reason.
//!
//! An [`AbortSignal`] is a [`CancellationToken`] paired with the reason it
//! was fired with. An [`AbortScope`] watches several signals at once and
//! resolves with the reason of whichever fires first.

use std::sync::{Arc, OnceLock};

use futures_util::future::select_all;
use tokio_util::sync::CancellationToken;

/// Independently triggerable cancellation signal.
///
/// Clones share state: aborting any clone aborts all of them. The first
/// reason wins; later calls to [`AbortSignal::abort`] are no-ops.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl AbortSignal {
    /// Create an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Only the first reason is kept.
    pub fn abort(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason the signal fired with, if it has.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        if self.is_aborted() {
            Some(self.reason_or_default())
        } else {
            None
        }
    }

    /// Resolve once the signal fires, yielding its reason.
    pub async fn aborted(&self) -> String {
        self.token.cancelled().await;
        self.reason_or_default()
    }

    fn reason_or_default(&self) -> String {
        self.reason
            .get()
            .cloned()
            .unwrap_or_else(|| "aborted".to_owned())
    }
}

/// First-to-fire merge over a set of abort signals.
#[derive(Debug, Clone)]
pub struct AbortScope {
    signals: Vec<AbortSignal>,
}

impl AbortScope {
    /// Watch the given signals.
    #[must_use]
    pub fn new(signals: impl IntoIterator<Item = AbortSignal>) -> Self {
        Self {
            signals: signals.into_iter().collect(),
        }
    }

    /// Reason of the first already-fired signal, in declaration order.
    #[must_use]
    pub fn fired(&self) -> Option<String> {
        self.signals.iter().find_map(AbortSignal::reason)
    }

    /// Resolve with the reason of whichever signal fires first.
    ///
    /// An empty scope never resolves.
    pub async fn first_fired(&self) -> String {
        if let Some(reason) = self.fired() {
            return reason;
        }
        if self.signals.is_empty() {
            return std::future::pending().await;
        }
        let waits = self
            .signals
            .iter()
            .map(|signal| Box::pin(signal.aborted()));
        let (reason, _, _) = select_all(waits).await;
        reason
    }
}
