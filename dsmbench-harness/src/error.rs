//! Error types for configuring and running the benchmark.

use std::io;

use dsmbench_fabric::FabricError;
use dsmbench_workload::WorkloadError;
use thiserror::Error;

/// An invalid benchmark configuration.
///
/// All of these are detected before any thread starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The cluster needs at least one node.
    #[error("node_count must be at least 1")]
    NoNodes,

    /// Every node needs at least one worker thread.
    #[error("thread_count must be at least 1")]
    NoThreads,

    /// The read ratio is a percentage.
    #[error("read_ratio {0} is not a percentage")]
    ReadRatio(u8),

    /// The warm-up ratio is a fraction of the key space.
    #[error("warmup_ratio {0} must be within [0, 1]")]
    WarmupRatio(f64),

    /// The key space must contain at least one key.
    #[error("key_space must contain at least one key")]
    EmptyKeySpace,

    /// The latency histogram needs at least one bucket.
    #[error("latency_buckets must be at least 1")]
    NoLatencyBuckets,

    /// The aggregator cannot sample in a zero interval.
    #[error("report_interval must not be zero")]
    ReportInterval,

    /// Latency must be reported every so many intervals.
    #[error("latency_report_every must be at least 1")]
    LatencyReportEvery,

    /// Parameters rejected by the request generators, such as an unsupported Zipf skew.
    #[error("invalid workload: {0}")]
    Workload(#[from] WorkloadError),
}

/// Errors that abort a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A request generator could not be constructed.
    #[error("invalid workload: {0}")]
    Workload(#[from] WorkloadError),

    /// A cluster collective failed, usually because a node never arrived.
    #[error(transparent)]
    Fabric(#[from] FabricError),

    /// The operating system refused to start a thread.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] io::Error),

    /// A worker thread panicked.
    #[error("worker {thread} on node {node} panicked")]
    WorkerPanicked {
        /// The node the worker ran on.
        node: usize,
        /// The worker's thread index on its node.
        thread: usize,
    },

    /// A simulated node's driver thread panicked.
    #[error("node {node} panicked")]
    NodePanicked {
        /// The node id.
        node: usize,
    },

    /// The index returned something other than what was written to it.
    #[error("index verification failed for key {key}: expected {expected:?}, found {actual:?}")]
    Verification {
        /// The key that was looked up.
        key: u64,
        /// The value that should be stored, or `None` if the key should be absent.
        expected: Option<u64>,
        /// The value the index returned.
        actual: Option<u64>,
    },
}

/// Result type for benchmark runs.
pub type BenchResult<T> = Result<T, BenchError>;
