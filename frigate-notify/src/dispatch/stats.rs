use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters describing dispatcher activity.
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    rejected: AtomicU64,
    delivery_failures: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
    /// Every call to `submit`.
    pub submitted: u64,
    /// Submissions refused because the queue was full or the dispatcher stopped.
    pub dropped: u64,
    /// Events a worker finished, rejected or not.
    pub processed: u64,
    pub rejected: u64,
    /// Individual sends that failed.
    pub delivery_failures: u64,
    /// Events still queued when the dispatcher stopped.
    pub discarded: u64,
}

impl DispatchStats {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, failures: u64) {
        self.delivery_failures.fetch_add(failures, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = DispatchStats::default();
        stats.record_submitted();
        stats.record_submitted();
        stats.record_dropped();
        stats.record_rejected();
        stats.record_delivered(2);
        stats.record_discarded(3);

        assert_eq!(
            stats.snapshot(),
            DispatchSnapshot {
                submitted: 2,
                dropped: 1,
                processed: 2,
                rejected: 1,
                delivery_failures: 2,
                discarded: 3,
            }
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(DispatchSnapshot::default()).unwrap();
        assert_eq!(json["dropped"], 0);
    }
}
