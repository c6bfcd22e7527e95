//! Connection statistics
//!
//! Counters shared between a connection and its worker thread.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live counters for one connection
#[derive(Debug, Default)]
pub struct WorkerStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    engines_created: AtomicU64,
    pending: AtomicUsize,
}

impl WorkerStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a pending slot only if nothing else is pending
    pub(crate) fn try_reserve_exclusive(&self) -> bool {
        self.pending
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Reserve a pending slot unconditionally
    pub(crate) fn reserve(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Give back a slot for a request that was never accepted
    pub(crate) fn release(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_engine_created(&self) {
        self.engines_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of an accepted request and free its slot
    pub(crate) fn record_outcome(&self, success: bool) {
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of accepted requests that have not been answered yet
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Take a consistent-enough snapshot for reporting
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            engines_created: self.engines_created.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests accepted onto the worker queue
    pub submitted: u64,
    /// Requests answered with `on_complete`
    pub completed: u64,
    /// Requests answered with `on_failure`
    pub failed: u64,
    /// Engine instances created
    pub engines_created: u64,
    /// Requests accepted but not yet answered
    pub pending: usize,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} submitted ({} completed, {} failed, {} pending), {} engine instances",
            self.submitted, self.completed, self.failed, self.pending, self.engines_created
        )
    }
}
