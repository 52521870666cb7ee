use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

/// Counters describing what a vat has done since it started.
///
/// Clones share the same counters, so a handle kept by an embedder observes
/// the running vat.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    processed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    ignored: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
    duplicates: Arc<AtomicU64>,
    gaps: Arc<AtomicU64>,
}

/// A point-in-time copy of [`Metrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Turns committed
    pub processed: u64,
    /// Turns rolled back
    pub failed: u64,
    /// Messages with an unknown command
    pub ignored: u64,
    /// Messages queued for delivery
    pub sent: u64,
    /// Inbound messages dropped as already applied
    pub duplicates: u64,
    /// Sequence gaps reported after timing out
    pub gaps: u64,
}

impl Metrics {
    /// Fresh counters, all zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self, count: usize) {
        self.sent.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_gap(&self) {
        self.gaps.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            gaps: self.gaps.load(Ordering::Relaxed),
        }
    }
}
