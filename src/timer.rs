//! Timer & suspension manager.
//!
//! At most one timer is armed per suspended item, keyed by [`TimerKey`]. The
//! key carries a per-scenario generation so an expiry that was already in
//! flight when its timer got cancelled (or re-armed by a later loop
//! iteration) is recognised as stale by the engine and dropped.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clock::TokioClock;
use crate::item::ItemUid;
use crate::scenario::ScenarioId;

/// Identity of one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerKey {
    /// Owning scenario.
    pub scenario: ScenarioId,
    /// Suspended item.
    pub item: ItemUid,
    /// Arming sequence number within the scenario.
    pub generation: u64,
}

/// Schedules one-shot wake-ups for suspended items.
pub trait TimerService: Send {
    /// Arm a timer firing at clock offset `deadline`.
    fn arm(&mut self, key: TimerKey, deadline: Duration);

    /// Cancel a timer. Returns whether it was still pending.
    fn cancel(&mut self, key: TimerKey) -> bool;
}

/// Timers fired explicitly by the caller; deterministic tests drive these.
#[derive(Debug, Default)]
pub struct ManualTimers {
    armed: BTreeMap<TimerKey, Duration>,
}

impl ManualTimers {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn take_due(&mut self, now: Duration) -> Vec<TimerKey> {
        let mut due: Vec<(Duration, TimerKey)> = self
            .armed
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, deadline)| (*deadline, *key))
            .collect();
        due.sort();
        for (_, key) in &due {
            self.armed.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.armed.values().min().copied()
    }

    /// Number of pending timers.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Whether `key` is pending.
    #[must_use]
    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.armed.contains_key(&key)
    }
}

impl TimerService for ManualTimers {
    fn arm(&mut self, key: TimerKey, deadline: Duration) {
        self.armed.insert(key, deadline);
    }

    fn cancel(&mut self, key: TimerKey) -> bool {
        self.armed.remove(&key).is_some()
    }
}

/// Timers backed by tokio tasks; expiry is posted to an event queue.
///
/// `arm` must be called from within a tokio runtime.
pub struct TokioTimers<E: Send + 'static> {
    clock: TokioClock,
    tx: mpsc::Sender<E>,
    wrap: fn(TimerKey) -> E,
    handles: HashMap<TimerKey, JoinHandle<()>>,
}

impl<E: Send + 'static> TokioTimers<E> {
    /// Post `wrap(key)` to `tx` when a timer fires.
    #[must_use]
    pub fn new(clock: TokioClock, tx: mpsc::Sender<E>, wrap: fn(TimerKey) -> E) -> Self {
        Self {
            clock,
            tx,
            wrap,
            handles: HashMap::new(),
        }
    }

    /// Number of timers not yet fired or cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.handles.values().filter(|h| !h.is_finished()).count()
    }
}

impl<E: Send + 'static> TimerService for TokioTimers<E> {
    fn arm(&mut self, key: TimerKey, deadline: Duration) {
        self.handles.retain(|_, h| !h.is_finished());
        let at = self.clock.instant_at(deadline);
        let tx = self.tx.clone();
        let event = (self.wrap)(key);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            // The executor may already be gone; nothing left to wake then.
            let _ = tx.send(event).await;
        });
        if let Some(previous) = self.handles.insert(key, handle) {
            previous.abort();
        }
    }

    fn cancel(&mut self, key: TimerKey) -> bool {
        match self.handles.remove(&key) {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }
}

impl<E: Send + 'static> Drop for TokioTimers<E> {
    fn drop(&mut self) {
        for handle in self.handles.values() {
            handle.abort();
        }
    }
}

impl<E: Send + 'static> std::fmt::Debug for TokioTimers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioTimers")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
