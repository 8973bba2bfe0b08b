//! Monotonic clocks.
//!
//! All scenario timestamps and deadlines are offsets from a clock's epoch.
//! [`MockClock`] is advanced by hand for deterministic tests; [`TokioClock`]
//! follows tokio's timer, so paused-time tests and real runs share a timeline
//! with [`crate::timer::TokioTimers`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Offset from the clock's epoch.
    fn now(&self) -> Duration;

    /// Time elapsed since an earlier offset.
    fn elapsed(&self, since: Duration) -> Duration {
        self.now().saturating_sub(since)
    }
}

/// Manually advanced clock.
#[derive(Debug, Default)]
pub struct MockClock {
    offset_ns: AtomicU64,
}

impl MockClock {
    /// Create a clock at offset zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        let delta = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        // fetch_update with a closure that always returns Some always succeeds
        let _ = self
            .offset_ns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(delta))
            });
    }

    /// Jump to an absolute offset.
    pub fn set(&self, offset: Duration) {
        let offset_ns = u64::try_from(offset.as_nanos()).unwrap_or(u64::MAX);
        self.offset_ns.store(offset_ns, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.offset_ns.load(Ordering::SeqCst))
    }
}

/// Clock backed by `tokio::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    epoch: tokio::time::Instant,
}

impl TokioClock {
    /// Start a clock whose epoch is now.
    #[must_use]
    pub fn start() -> Self {
        Self {
            epoch: tokio::time::Instant::now(),
        }
    }

    /// Epoch as a tokio instant.
    #[must_use]
    pub fn epoch(&self) -> tokio::time::Instant {
        self.epoch
    }

    /// Instant corresponding to an offset.
    #[must_use]
    pub fn instant_at(&self, offset: Duration) -> tokio::time::Instant {
        self.epoch + offset
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}
