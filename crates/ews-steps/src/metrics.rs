//! Global atomic counters for build observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a worker finishes its builds).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    builds_started: AtomicU64,
    builds_skipped: AtomicU64,
    steps_executed: AtomicU64,
    flaky_runs_absorbed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            builds_started: AtomicU64::new(0),
            builds_skipped: AtomicU64::new(0),
            steps_executed: AtomicU64::new(0),
            flaky_runs_absorbed: AtomicU64::new(0),
        }
    }

    pub fn inc_builds_started(&self) {
        self.builds_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "builds_started", "counter incremented");
    }

    /// A build that ended SKIPPED (irrelevant or invalid patch).
    pub fn inc_builds_skipped(&self) {
        self.builds_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "builds_skipped", "counter incremented");
    }

    pub fn inc_steps_executed(&self) {
        self.steps_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "steps_executed", "counter incremented");
    }

    /// A first test run failed but the rerun passed.
    pub fn inc_flaky_runs_absorbed(&self) {
        self.flaky_runs_absorbed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "flaky_runs_absorbed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            builds_started = self.builds_started(),
            builds_skipped = self.builds_skipped(),
            steps_executed = self.steps_executed(),
            flaky_runs_absorbed = self.flaky_runs_absorbed(),
        );
    }

    pub fn builds_started(&self) -> u64 {
        self.builds_started.load(Ordering::Relaxed)
    }

    pub fn builds_skipped(&self) -> u64 {
        self.builds_skipped.load(Ordering::Relaxed)
    }

    pub fn steps_executed(&self) -> u64 {
        self.steps_executed.load(Ordering::Relaxed)
    }

    pub fn flaky_runs_absorbed(&self) -> u64 {
        self.flaky_runs_absorbed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.builds_started.store(0, Ordering::Relaxed);
        self.builds_skipped.store(0, Ordering::Relaxed);
        self.steps_executed.store(0, Ordering::Relaxed);
        self.flaky_runs_absorbed.store(0, Ordering::Relaxed);
    }
}
