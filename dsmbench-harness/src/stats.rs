use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::histogram::LatencyHistogram;

/// Measurements of a single worker thread.
///
/// Only the owning worker records; the aggregator reads concurrently and tolerates values that
/// are a few operations behind.
#[derive(Debug)]
pub struct WorkerStats {
    ops: AtomicU64,
    latency: LatencyHistogram,
}

impl WorkerStats {
    /// Creates empty stats with `buckets` latency buckets.
    pub fn new(buckets: usize) -> Self {
        Self {
            ops: AtomicU64::new(0),
            latency: LatencyHistogram::new(buckets),
        }
    }

    /// Counts one completed operation that took `elapsed`.
    #[inline]
    pub fn record(&self, elapsed: Duration) {
        self.latency.record(elapsed);
        self.ops.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of operations completed since the last reset.
    pub fn ops(&self) -> u64 {
        self.ops.load(Ordering::Relaxed)
    }

    /// Resets the operation counter. Latencies are kept.
    pub fn reset_ops(&self) {
        self.ops.store(0, Ordering::Relaxed);
    }

    /// The latency histogram.
    pub fn latency(&self) -> &LatencyHistogram {
        &self.latency
    }
}

/// Sums the operation counters of all workers.
pub fn total_ops(stats: &[WorkerStats]) -> u64 {
    stats.iter().map(WorkerStats::ops).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_operations() {
        let stats = [WorkerStats::new(10), WorkerStats::new(10)];
        stats[0].record(Duration::from_nanos(150));
        stats[0].record(Duration::from_nanos(250));
        stats[1].record(Duration::from_micros(5));

        assert_eq!(stats[0].ops(), 2);
        assert_eq!(total_ops(&stats), 3);
        assert_eq!(stats[1].latency().snapshot().counts()[9], 1);

        stats[0].reset_ops();
        assert_eq!(total_ops(&stats), 1);
        assert_eq!(stats[0].latency().snapshot().total(), 2);
    }
}
