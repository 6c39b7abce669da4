//! Periodic throughput and latency reports of one node.
//!
//! Once the node is ready, the aggregator wakes up every report interval, computes the node's
//! throughput over the past interval and contributes it to the cluster-wide sum. Every node has to
//! run its aggregator with the same interval count, since each sample is a collective.
//!
//! Latency percentiles are computed over everything recorded since measurement started; the
//! histograms are never reset between reports.

use std::thread;
use std::time::Duration;

use dsmbench_fabric::{Cluster, Index};
use quanta::Instant;

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::BenchResult;
use crate::histogram::LatencySnapshot;
use crate::stats::{self, WorkerStats};

/// Cluster throughput is exchanged as a fixed-point number with this scale.
const THROUGHPUT_SCALE: f64 = 1000.0;

/// Throughput of one node over one report interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntervalSample {
    /// Operations completed in the interval.
    pub ops: u64,
    /// Length of the interval.
    pub elapsed: Duration,
}

impl IntervalSample {
    /// Operations per microsecond.
    pub fn throughput(&self) -> f64 {
        let micros = self.elapsed.as_secs_f64() * 1e6;
        if micros > 0.0 {
            self.ops as f64 / micros
        } else {
            0.0
        }
    }

    /// The throughput as contributed to the cluster sum.
    pub fn scaled(&self) -> u64 {
        (self.throughput() * THROUGHPUT_SCALE) as u64
    }
}

/// Converts a cluster sum of [`IntervalSample::scaled`] values back to operations per
/// microsecond.
pub fn unscale(sum: u64) -> f64 {
    sum as f64 / THROUGHPUT_SCALE
}

/// Outcome of the reporting loop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Report {
    /// Number of completed report intervals.
    pub intervals: u64,
    /// Time from readiness until the loop ended.
    pub elapsed: Duration,
    /// Cluster throughput of the last interval in operations per microsecond.
    pub cluster_throughput: f64,
}

/// Runs the reporting loop on the calling thread.
///
/// Waits for the node to become ready, then reports until [`Config::intervals`] have passed, in
/// which case all workers are stopped, or forever if the run is unbounded. Returns early with an
/// empty report if the run is stopped before the node is ready.
///
/// A run stopped by anything else, such as a failed worker, ends the loop after the current
/// interval's collective, so the node's failure can be reported.
pub fn run<N>(
    node: &N,
    config: &Config,
    coordinator: &Coordinator,
    stats: &[WorkerStats],
) -> BenchResult<Report>
where
    N: Index + Cluster + ?Sized,
{
    if !coordinator.wait_ready() {
        return Ok(Report::default());
    }

    let node_id = node.node_id();
    let limit = config.intervals();
    let every = u64::from(config.latency_report_every.max(1));

    let started = Instant::now();
    let mut last = started;
    let mut previous = 0;
    let mut report = Report::default();

    loop {
        thread::sleep(config.report_interval);

        let now = Instant::now();
        let total = stats::total_ops(stats);
        let sample = IntervalSample {
            ops: total.saturating_sub(previous),
            elapsed: now.duration_since(last),
        };
        previous = total;
        last = now;
        report.intervals += 1;

        if report.intervals % every == 0 {
            let snapshot = LatencySnapshot::merged(stats.iter().map(WorkerStats::latency));
            if let Some(percentiles) = snapshot.percentiles() {
                println!("{node_id}, {percentiles}");
            }
        }

        let cluster = match node.sum(sample.scaled()) {
            Ok(sum) => unscale(sum),
            Err(error) => {
                coordinator.stop();
                return Err(error.into());
            }
        };
        report.cluster_throughput = cluster;

        println!("{node_id}, throughput {:.4}", sample.throughput());
        if node.is_coordinator() {
            println!("cluster throughput {cluster:.3}");
            match node.cache_counters().hit_rate() {
                Some(rate) => println!("cache hit rate: {rate:.6}"),
                None => println!("cache hit rate: -"),
            }
        }

        if limit.is_some_and(|limit| report.intervals >= limit) {
            coordinator.stop();
            break;
        }
        if coordinator.is_stopped() {
            tracing::debug!(node = node_id, "run stopped, reporting ends early");
            break;
        }
    }

    report.elapsed = started.elapsed();
    tracing::debug!(node = node_id, intervals = report.intervals, "reporting finished");

    Ok(report)
}
