//! Cancellation and staleness helpers shared by the tracking poller and the
//! search debouncer.
//!
//! A [`CancellationToken`] stops work cooperatively. Whether a finished
//! result may still be applied is decided by comparing the [`Epoch`] captured
//! when the request was issued against the counter's current value.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Monotonic generation counter for one subscription or input session.
#[derive(Debug, Default)]
pub struct EpochCounter(AtomicU64);

impl EpochCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Epoch {
        Epoch(self.0.load(Ordering::Acquire))
    }

    /// Invalidates every previously captured epoch and returns the new one.
    pub fn advance(&self) -> Epoch {
        Epoch(self.0.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, captured: Epoch) -> bool {
        self.current() == captured
    }
}

/// Drives `fut` to completion unless `token` fires first.
pub async fn until_cancelled<F>(token: &CancellationToken, fut: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = fut => Some(output),
    }
}

/// Tracks fetch outcomes for one target so that only the first failure
/// before any success is reported.
#[derive(Debug, Default, Clone)]
pub struct FailureLedger {
    succeeded: bool,
    notified: bool,
    consecutive_failures: u32,
}

impl FailureLedger {
    pub fn record_success(&mut self) {
        self.succeeded = true;
        self.consecutive_failures = 0;
    }

    /// Returns `true` exactly once: on a failure that happens before the
    /// first success.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.succeeded || self.notified {
            return false;
        }
        self.notified = true;
        true
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
