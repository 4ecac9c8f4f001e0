use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for a single queue
#[derive(Debug, Default)]
pub struct LiveMetrics {
    jobs_enqueued: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_dead_lettered: AtomicU64,
    jobs_dropped: AtomicU64,
}

/// Point-in-time copy of [`LiveMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub completed: u64,
    /// Failed attempts, including ones that were retried afterwards
    pub failed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub dropped: u64,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.jobs_dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.jobs_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            completed: self.jobs_completed.load(Ordering::Relaxed),
            failed: self.jobs_failed.load(Ordering::Relaxed),
            retried: self.jobs_retried.load(Ordering::Relaxed),
            dead_lettered: self.jobs_dead_lettered.load(Ordering::Relaxed),
            dropped: self.jobs_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = LiveMetrics::new();
        metrics.record_enqueued();
        metrics.record_enqueued();
        metrics.record_failed();
        metrics.record_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.enqueued, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.completed, 0);
    }
}
