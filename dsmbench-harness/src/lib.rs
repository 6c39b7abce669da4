//! A multi-threaded, multi-node benchmark driver for a shared index.
//!
//! Every node runs a fixed pool of worker threads against the index. A run goes through these
//! stages:
//!
//! 1. Node 0 optionally [verifies](verify) the index and preloads it with a fixed set of keys.
//! 2. All nodes meet at a cluster barrier and start their [workers](worker).
//! 3. The workers insert their share of the warm-up keys. The [coordinator] waits for all workers
//!    of all nodes before it publishes readiness.
//! 4. The workers issue Zipf-distributed reads and writes, recording per-request latency in their
//!    own [histograms](histogram).
//! 5. The [aggregator] of every node reports node and cluster throughput at a fixed interval,
//!    along with latency percentiles.
//!
//! Runs are unbounded unless a duration is configured. See [`config::Config`] for all options.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod aggregator;
pub mod bench;
/// Command line entry point of the `dsmbench` binary.
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod histogram;
/// Log output of the benchmark.
pub mod observability;
/// Per-worker throughput and latency counters.
pub mod stats;
/// Correctness check of the index.
pub mod verify;
/// Partitioning of the warm-up keys among all workers of the cluster.
pub mod warmup;
/// The benchmark worker thread.
pub mod worker;
