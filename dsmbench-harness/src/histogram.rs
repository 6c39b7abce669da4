//! Fixed-resolution latency histograms.
//!
//! Every worker owns one [`LatencyHistogram`] and is the only thread incrementing it. The
//! aggregator merges all histograms of a node into a [`LatencySnapshot`] to compute percentiles,
//! reading the buckets with relaxed loads while the workers keep recording.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The width of every bucket.
pub const BUCKET_WIDTH: Duration = Duration::from_nanos(100);

/// The percentiles reported by [`LatencySnapshot::percentiles`], in per mille.
const REPORTED_PER_MILLE: [u64; 5] = [500, 900, 950, 990, 999];

/// Counts durations in buckets of [`BUCKET_WIDTH`].
///
/// Durations beyond the last bucket are counted in the last bucket.
pub struct LatencyHistogram {
    buckets: Box<[AtomicU64]>,
}

impl LatencyHistogram {
    /// Creates a histogram with `buckets` buckets, at least one.
    pub fn new(buckets: usize) -> Self {
        Self {
            buckets: (0..buckets.max(1)).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Always `false`, a histogram has at least one bucket.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Counts a single duration.
    #[inline]
    pub fn record(&self, duration: Duration) {
        let index = duration.as_nanos() / BUCKET_WIDTH.as_nanos();
        let index = usize::try_from(index)
            .unwrap_or(usize::MAX)
            .min(self.buckets.len() - 1);
        self.buckets[index].fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current bucket counts.
    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            counts: self.load().collect(),
        }
    }

    fn load(&self) -> impl Iterator<Item = u64> + '_ {
        self.buckets.iter().map(|b| b.load(Ordering::Relaxed))
    }
}

impl fmt::Debug for LatencyHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencyHistogram")
            .field("buckets", &self.buckets.len())
            .field("count", &self.load().sum::<u64>())
            .finish()
    }
}

/// Bucket counts of one or more merged histograms.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LatencySnapshot {
    counts: Vec<u64>,
}

impl LatencySnapshot {
    /// Merges the histograms into one snapshot.
    pub fn merged<'a>(histograms: impl IntoIterator<Item = &'a LatencyHistogram>) -> Self {
        let mut snapshot = Self::default();
        for histogram in histograms {
            snapshot.add(histogram);
        }
        snapshot
    }

    /// Adds the current counts of `histogram` to this snapshot.
    pub fn add(&mut self, histogram: &LatencyHistogram) {
        if self.counts.len() < histogram.len() {
            self.counts.resize(histogram.len(), 0);
        }
        for (count, value) in self.counts.iter_mut().zip(histogram.load()) {
            *count += value;
        }
    }

    /// The bucket counts.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Total number of recorded durations.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Returns the latency below which the fraction `quantile` of all durations fall.
    ///
    /// Returns `None` if nothing has been recorded.
    pub fn percentile(&self, quantile: f64) -> Option<Duration> {
        let total = self.total();
        if total == 0 {
            return None;
        }

        let threshold = ((total as f64 * quantile).ceil() as u64).clamp(1, total);
        let mut cumulative = 0;
        for (index, count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= threshold {
                return Some(bucket_value(index));
            }
        }

        None
    }

    /// Computes p50, p90, p95, p99 and p999 in a single pass over the buckets.
    ///
    /// Returns `None` if nothing has been recorded.
    pub fn percentiles(&self) -> Option<Percentiles> {
        let total = self.total();
        if total == 0 {
            return None;
        }

        let thresholds = REPORTED_PER_MILLE.map(|pm| (total * pm).div_ceil(1000).max(1));
        let mut values = [Duration::ZERO; REPORTED_PER_MILLE.len()];
        let mut found = 0;
        let mut cumulative = 0;

        for (index, count) in self.counts.iter().enumerate() {
            cumulative += count;
            while found < thresholds.len() && cumulative >= thresholds[found] {
                values[found] = bucket_value(index);
                found += 1;
            }
            if found == thresholds.len() {
                break;
            }
        }

        let [p50, p90, p95, p99, p999] = values;
        Some(Percentiles {
            p50,
            p90,
            p95,
            p99,
            p999,
        })
    }
}

/// The latency a bucket stands for: the middle of its range.
fn bucket_value(index: usize) -> Duration {
    let width = BUCKET_WIDTH.as_nanos() as u64;
    Duration::from_nanos(index as u64 * width + width / 2)
}

/// Latency percentiles of a set of requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Percentiles {
    /// Median latency.
    pub p50: Duration,
    /// 90th percentile.
    pub p90: Duration,
    /// 95th percentile.
    pub p95: Duration,
    /// 99th percentile.
    pub p99: Duration,
    /// 99.9th percentile.
    pub p999: Duration,
}

impl fmt::Display for Percentiles {
    /// Formats all percentiles in microseconds.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let us = |d: Duration| d.as_nanos() as f64 / 1000.0;
        write!(
            f,
            "p50 {:.2}\tp90 {:.2}\tp95 {:.2}\tp99 {:.2}\tp999 {:.2}",
            us(self.p50),
            us(self.p90),
            us(self.p95),
            us(self.p99),
            us(self.p999),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(nanos: u64) -> Duration {
        Duration::from_nanos(nanos)
    }

    #[test]
    fn records_into_buckets() {
        let histogram = LatencyHistogram::new(3);
        for nanos in [50, 150, 250, 50] {
            histogram.record(ns(nanos));
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.counts(), &[2, 1, 1]);
        assert_eq!(snapshot.percentile(0.5), Some(ns(50)));
        assert_eq!(snapshot.percentiles().unwrap().p50, ns(50));
    }

    #[test]
    fn last_bucket_absorbs_overflow() {
        let histogram = LatencyHistogram::new(10);
        histogram.record(Duration::from_secs(1));
        histogram.record(Duration::MAX);
        histogram.record(ns(999));

        assert_eq!(histogram.snapshot().counts()[9], 3);
    }

    #[test]
    fn bucket_boundaries() {
        let histogram = LatencyHistogram::new(4);
        histogram.record(ns(0));
        histogram.record(ns(99));
        histogram.record(ns(100));
        histogram.record(ns(199));
        histogram.record(ns(200));

        assert_eq!(histogram.snapshot().counts(), &[2, 2, 1, 0]);
    }

    #[test]
    fn empty_has_no_percentiles() {
        let snapshot = LatencyHistogram::new(100).snapshot();
        assert_eq!(snapshot.total(), 0);
        assert_eq!(snapshot.percentile(0.5), None);
        assert_eq!(snapshot.percentiles(), None);
    }

    #[test]
    fn percentiles_are_monotonic() {
        let histogram = LatencyHistogram::new(1000);
        // A long tail: most requests are fast, a few are very slow.
        for i in 0..10_000u64 {
            let nanos = if i % 100 == 0 { 50_000 + i } else { 100 + i % 700 };
            histogram.record(ns(nanos));
        }

        let p = histogram.snapshot().percentiles().unwrap();
        assert!(p.p50 <= p.p90);
        assert!(p.p90 <= p.p95);
        assert!(p.p95 <= p.p99);
        assert!(p.p99 <= p.p999);
        assert!(p.p999 > ns(50_000));
    }

    #[test]
    fn single_pass_matches_individual_lookups() {
        let histogram = LatencyHistogram::new(100);
        for i in 0..1234u64 {
            histogram.record(ns((i * 37) % 9000));
        }

        let snapshot = histogram.snapshot();
        let p = snapshot.percentiles().unwrap();
        assert_eq!(Some(p.p50), snapshot.percentile(0.5));
        assert_eq!(Some(p.p90), snapshot.percentile(0.9));
        assert_eq!(Some(p.p99), snapshot.percentile(0.99));
    }

    #[test]
    fn single_sample() {
        let histogram = LatencyHistogram::new(100);
        histogram.record(ns(420));

        let p = histogram.snapshot().percentiles().unwrap();
        assert_eq!(p.p50, ns(450));
        assert_eq!(p.p999, ns(450));
    }

    #[test]
    fn merges_histograms() {
        let a = LatencyHistogram::new(3);
        let b = LatencyHistogram::new(3);
        a.record(ns(50));
        b.record(ns(150));
        b.record(ns(150));

        let snapshot = LatencySnapshot::merged([&a, &b]);
        assert_eq!(snapshot.counts(), &[1, 2, 0]);
        assert_eq!(snapshot.total(), 3);
        assert_eq!(snapshot.percentile(0.5), Some(ns(150)));
    }

    #[test]
    fn display_in_microseconds() {
        let p = Percentiles {
            p50: ns(50),
            p90: ns(1_250),
            p95: ns(2_050),
            p99: ns(10_050),
            p999: ns(99_950),
        };
        assert_eq!(
            p.to_string(),
            "p50 0.05\tp90 1.25\tp95 2.05\tp99 10.05\tp999 99.95"
        );
    }
}
