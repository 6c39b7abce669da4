use std::hint;
use std::thread;

use core_affinity::CoreId;
use dsmbench_fabric::{Cluster, Index};
use dsmbench_workload::{Action, KeyMapper, RequestGenerator, ZipfGenerator};
use quanta::{Clock, Instant};

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::BenchResult;
use crate::stats::WorkerStats;
use crate::warmup::WarmupPartition;

/// A benchmark worker thread of one node.
///
/// The worker inserts its share of the warm-up keys, waits until the whole cluster is warm and
/// then issues requests until the run is stopped, recording the latency of every request in its
/// own [`WorkerStats`].
#[derive(Debug)]
pub struct Worker<'a, N: ?Sized> {
    /// The node this worker runs on.
    pub node: &'a N,
    /// The benchmark configuration.
    pub config: &'a Config,
    /// Coordination with the other workers of this node.
    pub coordinator: &'a Coordinator,
    /// Stats of all workers of this node, indexed by worker id.
    pub stats: &'a [WorkerStats],
    /// Index of this worker on its node.
    pub id: usize,
    /// The core to pin this worker to.
    pub core: Option<CoreId>,
}

impl<N> Worker<'_, N>
where
    N: Index + Cluster + ?Sized,
{
    /// Id of this worker across the whole cluster.
    pub fn global_id(&self) -> usize {
        self.config.thread_count * self.node.node_id() + self.id
    }

    /// Runs the worker to completion on the calling thread.
    pub fn run(self) -> BenchResult<()> {
        let _guard = StopOnPanic(self.coordinator);

        if let Some(core) = self.core {
            if !core_affinity::set_for_current(core) {
                tracing::warn!(core = core.id, worker = self.id, "failed to pin worker thread");
            }
        }

        self.node.register_thread();
        let result = self.run_registered();
        self.node.reset_thread();

        if result.is_err() {
            self.coordinator.stop();
        }
        result
    }

    fn run_registered(&self) -> BenchResult<()> {
        let global_id = self.global_id();
        let threads = self.config.thread_count * self.node.cluster_size();
        tracing::debug!(
            node = self.node.node_id(),
            worker = self.id,
            global_id,
            "worker started"
        );

        let keys = KeyMapper::new(self.config.key_space)?;
        let started = (self.id == 0).then(|| self.coordinator.begin_warmup());

        let partition =
            WarmupPartition::new(self.config.warmup_end(), threads as u64, global_id as u64);
        for seq in partition {
            if self.coordinator.is_stopped() {
                break;
            }
            self.node.insert(keys.map(seq), seq * 2);
        }
        self.coordinator.finish_warmup();

        if let Some(started) = started {
            self.coordinator.synchronize(self.node, self.stats, started)?;
        }

        if !self.coordinator.wait_ready() {
            return Ok(());
        }

        self.measure(keys, global_id)
    }

    fn measure(&self, keys: KeyMapper, global_id: usize) -> BenchResult<()> {
        let seed = ZipfGenerator::thread_seed(Clock::new().raw(), global_id as u64);
        let zipf = ZipfGenerator::new(self.config.key_space, self.config.zipf_theta, seed)?;
        let mut requests = RequestGenerator::new(zipf, keys, self.config.read_ratio, seed)?;
        let stats = &self.stats[self.id];

        while !self.coordinator.is_stopped() {
            let request = requests.next_request();

            let start = Instant::now();
            match request.action {
                Action::Read => {
                    hint::black_box(self.node.search(request.key));
                }
                Action::Write => self.node.insert(request.key, request.value),
            }
            stats.record(start.elapsed());
        }

        Ok(())
    }
}

/// Stops the run if the owning worker panics, so that nobody waits for it forever.
struct StopOnPanic<'a>(&'a Coordinator);

impl Drop for StopOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.stop();
        }
    }
}
