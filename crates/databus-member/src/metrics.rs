//! Metrics for member transaction processing
//!
//! Counters are updated from the member's execution context and may be read
//! from anywhere through [`Metrics::snapshot`].
//!
//! ## Usage
//!
//! ```ignore
//! use databus_member::metrics::{Metrics, MetricsRecorder};
//!
//! let metrics = Metrics::new();
//! metrics.record_prepare();
//! metrics.record_matches(3);
//! assert_eq!(metrics.snapshot().matches, 3);
//! ```

use crate::domain::registration::RegistrationId;
use crate::domain::response::ResponseStatsSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for one member
#[derive(Debug, Default)]
pub struct Metrics {
    /// Prepare requests received
    pub prepares: AtomicU64,
    /// Precommit requests received
    pub precommits: AtomicU64,
    /// Commit requests received
    pub commits: AtomicU64,
    /// Abort requests received
    pub aborts: AtomicU64,
    /// Precommit/commit/abort for ids not in the store
    pub unknown_xact_nacks: AtomicU64,
    /// Matches produced
    pub matches: AtomicU64,
    /// Prepare handlers that deferred
    pub async_deferrals: AtomicU64,
    /// Result messages handed to the router sink
    pub results_sent: AtomicU64,
    pub xacts_created: AtomicU64,
    pub xacts_removed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_prepare(&self) {
        self.prepares.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_precommit(&self) {
        self.precommits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_xact(&self) {
        self.unknown_xact_nacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_matches(&self, count: usize) {
        self.matches.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_async_deferral(&self) {
        self.async_deferrals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_result_sent(&self) {
        self.results_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_xact_created(&self) {
        self.xacts_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_xact_removed(&self) {
        self.xacts_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Transactions created and not yet removed.
    pub fn live_xacts(&self) -> u64 {
        let created = self.xacts_created.load(Ordering::Relaxed);
        let removed = self.xacts_removed.load(Ordering::Relaxed);
        created.saturating_sub(removed)
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            prepares: self.prepares.load(Ordering::Relaxed),
            precommits: self.precommits.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            unknown_xact_nacks: self.unknown_xact_nacks.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            async_deferrals: self.async_deferrals.load(Ordering::Relaxed),
            results_sent: self.results_sent.load(Ordering::Relaxed),
            xacts_created: self.xacts_created.load(Ordering::Relaxed),
            xacts_removed: self.xacts_removed.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.prepares,
            &self.precommits,
            &self.commits,
            &self.aborts,
            &self.unknown_xact_nacks,
            &self.matches,
            &self.async_deferrals,
            &self.results_sent,
            &self.xacts_created,
            &self.xacts_removed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub prepares: u64,
    pub precommits: u64,
    pub commits: u64,
    pub aborts: u64,
    pub unknown_xact_nacks: u64,
    pub matches: u64,
    pub async_deferrals: u64,
    pub results_sent: u64,
    pub xacts_created: u64,
    pub xacts_removed: u64,
}

/// Member-wide view returned by `stats`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStats {
    pub metrics: MetricsSnapshot,
    pub registrations: usize,
    pub transactions: usize,
    /// Response counters per registration, in store order.
    pub registration_stats: Vec<(RegistrationId, ResponseStatsSnapshot)>,
}

/// Trait for custom metrics recording implementations
pub trait MetricsRecorder: Send + Sync {
    fn record_prepare(&self);
    fn record_precommit(&self);
    fn record_commit(&self);
    fn record_abort(&self);
    fn record_unknown_xact(&self);
    fn record_matches(&self, count: usize);
    fn record_async_deferral(&self);
    fn record_result_sent(&self);
    fn record_xact_created(&self);
    fn record_xact_removed(&self);
}

/// No-op metrics recorder for when metrics are disabled
#[derive(Default)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_prepare(&self) {}
    fn record_precommit(&self) {}
    fn record_commit(&self) {}
    fn record_abort(&self) {}
    fn record_unknown_xact(&self) {}
    fn record_matches(&self, _: usize) {}
    fn record_async_deferral(&self) {}
    fn record_result_sent(&self) {}
    fn record_xact_created(&self) {}
    fn record_xact_removed(&self) {}
}

impl MetricsRecorder for Metrics {
    fn record_prepare(&self) {
        Metrics::record_prepare(self);
    }

    fn record_precommit(&self) {
        Metrics::record_precommit(self);
    }

    fn record_commit(&self) {
        Metrics::record_commit(self);
    }

    fn record_abort(&self) {
        Metrics::record_abort(self);
    }

    fn record_unknown_xact(&self) {
        Metrics::record_unknown_xact(self);
    }

    fn record_matches(&self, count: usize) {
        Metrics::record_matches(self, count);
    }

    fn record_async_deferral(&self) {
        Metrics::record_async_deferral(self);
    }

    fn record_result_sent(&self) {
        Metrics::record_result_sent(self);
    }

    fn record_xact_created(&self) {
        Metrics::record_xact_created(self);
    }

    fn record_xact_removed(&self) {
        Metrics::record_xact_removed(self);
    }
}
