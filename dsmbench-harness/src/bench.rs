//! Running the benchmark on one node, or on a whole in-process cluster.

use std::thread::{self, ScopedJoinHandle};
use std::time::Duration;

use dsmbench_fabric::{CacheCounters, Cluster, FabricError, Index, LocalFabric};
use dsmbench_workload::KeyMapper;
use quanta::Instant;
use rand::Rng;

use crate::aggregator;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::{BenchError, BenchResult};
use crate::histogram::{LatencySnapshot, Percentiles};
use crate::stats::{self, WorkerStats};
use crate::verify;
use crate::worker::Worker;

/// Barrier tag all nodes meet at before they start their workers.
pub const BENCHMARK_BARRIER: &str = "benchmark";

/// Results of a finished run on one node.
#[derive(Clone, Debug)]
pub struct NodeSummary {
    /// The node id.
    pub node: usize,
    /// How long the cluster-wide warm-up took.
    pub warmup: Duration,
    /// Operations measured on this node.
    pub ops: u64,
    /// Length of the measurement phase.
    pub elapsed: Duration,
    /// Number of report intervals.
    pub intervals: u64,
    /// Latency percentiles over all measured operations, if there were any.
    pub latency: Option<Percentiles>,
    /// Index cache statistics of the measurement phase.
    pub cache: CacheCounters,
}

impl NodeSummary {
    /// Mean throughput in operations per microsecond.
    pub fn throughput(&self) -> f64 {
        let micros = self.elapsed.as_secs_f64() * 1e6;
        if micros > 0.0 {
            self.ops as f64 / micros
        } else {
            0.0
        }
    }
}

/// Runs the benchmark on `node`.
///
/// Node 0 optionally verifies the index and then preloads it. All nodes meet at the
/// [`BENCHMARK_BARRIER`] before starting their workers, then run until the configured duration
/// has passed. Without a duration, this never returns unless the run fails.
pub fn run_node<N>(node: &N, config: &Config) -> BenchResult<NodeSummary>
where
    N: Index + Cluster + ?Sized,
{
    config.validate()?;

    let node_id = node.node_id();
    node.register_thread();
    let prepared = prepare(node, config);
    node.reset_thread();
    prepared?;

    let coordinator = Coordinator::new(config.thread_count);
    let stats: Vec<WorkerStats> = (0..config.thread_count)
        .map(|_| WorkerStats::new(config.latency_buckets))
        .collect();

    let cores = if config.pin_threads {
        core_affinity::get_core_ids().unwrap_or_default()
    } else {
        Vec::new()
    };
    if config.pin_threads && cores.len() < config.total_threads() {
        tracing::warn!(
            cores = cores.len(),
            threads = config.total_threads(),
            "more worker threads than cores, some share a core"
        );
    }

    let report = thread::scope(|s| -> BenchResult<aggregator::Report> {
        let mut handles = Vec::with_capacity(config.thread_count);
        for id in 0..config.thread_count {
            let global_id = config.thread_count * node_id + id;
            let worker = Worker {
                node,
                config,
                coordinator: &coordinator,
                stats: &stats,
                id,
                core: (!cores.is_empty()).then(|| cores[global_id % cores.len()]),
            };

            let spawned = thread::Builder::new()
                .name(format!("node{node_id}-worker{id}"))
                .spawn_scoped(s, move || worker.run());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    coordinator.stop();
                    join_workers(node_id, handles)?;
                    return Err(BenchError::from(error));
                }
            }
        }

        let report = aggregator::run(node, config, &coordinator, &stats);
        if report.is_err() {
            coordinator.stop();
        }

        join_workers(node_id, handles)?;
        report
    })?;

    let latency = LatencySnapshot::merged(stats.iter().map(WorkerStats::latency)).percentiles();
    Ok(NodeSummary {
        node: node_id,
        warmup: coordinator.warmup_time(),
        ops: stats::total_ops(&stats),
        elapsed: report.elapsed,
        intervals: report.intervals,
        latency,
        cache: node.cache_counters(),
    })
}

/// Runs everything before the workers start, on the node's own registered thread.
fn prepare<N>(node: &N, config: &Config) -> BenchResult<()>
where
    N: Index + Cluster + ?Sized,
{
    if node.is_coordinator() {
        if config.verify {
            verify::check(node, config.verify_keys)?;
            println!("index verification passed ({} keys)", config.verify_keys);
        }
        preload(node, config)?;
    }

    node.barrier(BENCHMARK_BARRIER)?;
    Ok(())
}

/// Inserts `preload_keys` keys, mapped onto the key space.
///
/// The `i`-th insert writes `2i`. Its key is derived from `i` itself, or from a random number in
/// `1..=preload_keys` with [`Config::preload_random`]. Prints the traffic the preload caused.
fn preload<N>(index: &N, config: &Config) -> BenchResult<()>
where
    N: Index + ?Sized,
{
    let keys = KeyMapper::new(config.key_space)?;
    let mut rng = rand::rng();
    let started = Instant::now();
    for seq in 1..=config.preload_keys {
        let source = if config.preload_random {
            rng.random_range(1..=config.preload_keys)
        } else {
            seq
        };
        index.insert(keys.map(source), seq * 2);
    }

    tracing::info!(
        keys = config.preload_keys,
        random = config.preload_random,
        elapsed = ?started.elapsed(),
        "preloaded index"
    );

    let traffic = index.transport_counters();
    println!("total read cnt: {}", traffic.reads);
    println!("total read bytes: {}", traffic.read_bytes);
    println!("total write cnt: {}", traffic.writes);
    println!("total write bytes: {}", traffic.write_bytes);
    Ok(())
}

/// Joins all workers, returning the first error or panic.
fn join_workers(
    node: usize,
    handles: Vec<ScopedJoinHandle<'_, BenchResult<()>>>,
) -> BenchResult<()> {
    let mut result = Ok(());
    for (thread, handle) in handles.into_iter().enumerate() {
        let outcome = handle
            .join()
            .unwrap_or_else(|_| Err(BenchError::WorkerPanicked { node, thread }));
        if result.is_ok() {
            result = outcome;
        }
    }
    result
}

/// Runs the benchmark on a fresh in-process cluster of `config.node_count` nodes.
pub fn run_local(config: &Config) -> BenchResult<Vec<NodeSummary>> {
    config.validate()?;
    let fabric = LocalFabric::with_timeout(config.node_count, config.barrier_timeout);
    run_on(&fabric, config)
}

/// Runs the benchmark on all nodes of `fabric`, each on its own thread.
///
/// A node that fails shuts the fabric down, which releases the other nodes from their
/// collectives. Returns the summaries ordered by node id, or the error of the node that failed
/// first. Errors caused by the shutdown itself are only reported if there is no other error.
pub fn run_on(fabric: &LocalFabric, config: &Config) -> BenchResult<Vec<NodeSummary>> {
    tracing::info!(
        nodes = fabric.size(),
        threads = config.thread_count,
        read_ratio = config.read_ratio,
        "starting benchmark"
    );

    let nodes = fabric.nodes();
    thread::scope(|s| -> BenchResult<Vec<NodeSummary>> {
        let mut handles = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let spawned = thread::Builder::new()
                .name(format!("node{}", node.node_id()))
                .spawn_scoped(s, move || {
                    let mut guard = ShutdownOnFailure {
                        fabric,
                        armed: true,
                    };
                    let result = run_node(node, config);
                    guard.armed = result.is_err();
                    result
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    // Nodes that already started would wait for this one forever.
                    fabric.shutdown();
                    return Err(BenchError::from(error));
                }
            }
        }

        let mut summaries = Vec::with_capacity(handles.len());
        let mut errors = Vec::new();
        for (node, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(summary)) => summaries.push(summary),
                Ok(Err(error)) => errors.push(error),
                Err(_) => errors.push(BenchError::NodePanicked { node }),
            }
        }

        let cause = errors
            .iter()
            .position(|error| !is_shutdown(error))
            .unwrap_or(0);
        match errors.into_iter().nth(cause) {
            Some(error) => Err(error),
            None => Ok(summaries),
        }
    })
}

/// Shuts the fabric down when dropped while armed, which includes a panicking node thread.
struct ShutdownOnFailure<'a> {
    fabric: &'a LocalFabric,
    armed: bool,
}

impl Drop for ShutdownOnFailure<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.fabric.shutdown();
        }
    }
}

fn is_shutdown(error: &BenchError) -> bool {
    matches!(error, BenchError::Fabric(FabricError::ShutDown { .. }))
}
