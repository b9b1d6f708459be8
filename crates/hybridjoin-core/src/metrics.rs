//! Lock-free join metrics.
//!
//! The coordinator is the only writer. Readers (lifecycle handles,
//! dashboards) take [`MetricsSnapshot`]s at any time without locking.

use std::sync::atomic::{AtomicU64, Ordering};

/// Join counters and gauges using atomics (no locks on the data path).
#[derive(Debug, Default)]
pub struct JoinMetrics {
    /// Tuples admitted into the window.
    pub admitted: AtomicU64,
    /// Tuples evicted by a match.
    pub matched: AtomicU64,
    /// Matched pairs delivered to the sink.
    pub emitted_pairs: AtomicU64,
    /// Tuples evicted by the fallback residency policy.
    pub expired: AtomicU64,
    /// Probe calls issued.
    pub probe_calls: AtomicU64,
    /// Probe calls that failed.
    pub probe_failures: AtomicU64,
    /// Sink deliveries that failed.
    pub sink_failures: AtomicU64,
    /// Completed rounds.
    pub rounds: AtomicU64,
    /// Resident tuples at the last round boundary.
    pub occupancy: AtomicU64,
    /// Available capacity at the last round boundary.
    pub avail: AtomicU64,
}

impl JoinMetrics {
    /// Records an admission.
    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `n` matched (evicted) tuples.
    pub fn record_matched(&self, n: u64) {
        self.matched.fetch_add(n, Ordering::Relaxed);
    }

    /// Records a delivered pair.
    pub fn record_emitted(&self) {
        self.emitted_pairs.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an expired tuple.
    pub fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a probe call and whether it failed.
    pub fn record_probe(&self, failed: bool) {
        self.probe_calls.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.probe_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a failed sink delivery.
    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Publishes window gauges at a round boundary.
    pub fn publish_window(&self, occupancy: usize, avail: usize) {
        self.occupancy.store(occupancy as u64, Ordering::Relaxed);
        self.avail.store(avail as u64, Ordering::Relaxed);
    }

    /// Records a completed round.
    pub fn record_round(&self) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            emitted_pairs: self.emitted_pairs.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            probe_calls: self.probe_calls.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            rounds: self.rounds.load(Ordering::Relaxed),
            occupancy: self.occupancy.load(Ordering::Relaxed),
            avail: self.avail.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of join metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Tuples admitted.
    pub admitted: u64,
    /// Tuples matched.
    pub matched: u64,
    /// Pairs delivered.
    pub emitted_pairs: u64,
    /// Tuples expired.
    pub expired: u64,
    /// Probe calls.
    pub probe_calls: u64,
    /// Failed probe calls.
    pub probe_failures: u64,
    /// Failed sink deliveries.
    pub sink_failures: u64,
    /// Completed rounds.
    pub rounds: u64,
    /// Current occupancy.
    pub occupancy: u64,
    /// Current available capacity.
    pub avail: u64,
}
