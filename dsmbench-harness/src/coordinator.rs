//! Warm-up and readiness coordination of the workers on one node.
//!
//! The workers of a node progress through these phases:
//!
//! ```text
//! Init -> Warming -> LocalDone -> ClusterSynced -> Ready
//! ```
//!
//! Worker 0 drives all transitions. It starts the warm-up timer, waits until every local worker
//! has finished inserting its share of the key space and then meets the other nodes at the
//! `warm_finish` barrier. Once all nodes have arrived, it records the warm-up time, resets the
//! index statistics and publishes readiness. No worker starts measuring before that.
//!
//! Waiters spin on atomics for a short while and then park on a condition variable until the
//! next transition. Any failure, and the end of a bounded run, raise the stop flag, which releases
//! every waiter.

use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use dsmbench_fabric::{Cluster, Index};
use quanta::Instant;

use crate::error::BenchResult;
use crate::stats::WorkerStats;

/// Barrier tag all nodes meet at after their warm-up.
pub const WARM_FINISH: &str = "warm_finish";

/// Spins before a waiting thread parks.
const SPINS_BEFORE_PARK: u32 = 1 << 10;

/// Upper bound for a single park, in case a wakeup races with going to sleep.
const PARK_TIMEOUT: Duration = Duration::from_millis(10);

/// The warm-up phase of a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    /// Workers are being started.
    Init = 0,
    /// Workers insert the warm-up keys.
    Warming = 1,
    /// All local workers are done, other nodes may still be warming up.
    LocalDone = 2,
    /// All nodes are done.
    ClusterSynced = 3,
    /// Measurement has started.
    Ready = 4,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Init,
            1 => Phase::Warming,
            2 => Phase::LocalDone,
            3 => Phase::ClusterSynced,
            _ => Phase::Ready,
        }
    }
}

/// Shared state coordinating the workers of one node.
#[derive(Debug)]
pub struct Coordinator {
    threads: usize,
    phase: AtomicU8,
    finished: AtomicUsize,
    ready: AtomicBool,
    stop: AtomicBool,
    warmup_nanos: AtomicU64,
    lock: Mutex<()>,
    wakeup: Condvar,
}

impl Coordinator {
    /// Creates the coordinator for `threads` local workers.
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            phase: AtomicU8::new(Phase::Init as u8),
            finished: AtomicUsize::new(0),
            ready: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            warmup_nanos: AtomicU64::new(0),
            lock: Mutex::new(()),
            wakeup: Condvar::new(),
        }
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn enter(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
        tracing::debug!(?phase, "entered phase");
    }

    /// Marks the start of the warm-up and returns the start time.
    ///
    /// Called by worker 0.
    pub fn begin_warmup(&self) -> Instant {
        self.enter(Phase::Warming);
        Instant::now()
    }

    /// Signals that the calling worker has inserted all of its warm-up keys.
    pub fn finish_warmup(&self) {
        self.finished.fetch_add(1, Ordering::AcqRel);
        self.notify();
    }

    /// Number of local workers that have finished their warm-up.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::Acquire)
    }

    /// Synchronizes the warm-up with the rest of the cluster and publishes readiness.
    ///
    /// Called by worker 0 after its own warm-up. Blocks until all local workers are done and all
    /// nodes have arrived at the [`WARM_FINISH`] barrier. Resets the operation counters in
    /// `stats`, so that warm-up inserts are not measured.
    ///
    /// On failure, the stop flag is raised before the error is returned.
    pub fn synchronize<N>(
        &self,
        node: &N,
        stats: &[WorkerStats],
        started: Instant,
    ) -> BenchResult<()>
    where
        N: Index + Cluster + ?Sized,
    {
        if !self.spin_until(|| self.finished() == self.threads) {
            return Ok(());
        }
        self.enter(Phase::LocalDone);
        println!("node {} finish", node.node_id());

        if let Err(error) = node.barrier(WARM_FINISH) {
            self.stop();
            return Err(error.into());
        }
        self.enter(Phase::ClusterSynced);

        let elapsed = started.elapsed();
        self.warmup_nanos.store(
            u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        println!("warmup time {}s", elapsed.as_secs());

        node.collect_cache_statistics();
        node.clear_statistics();
        stats.iter().for_each(WorkerStats::reset_ops);

        self.finished.store(0, Ordering::Release);
        self.enter(Phase::Ready);
        self.ready.store(true, Ordering::Release);
        self.notify();
        tracing::info!(node = node.node_id(), ?elapsed, "warm-up finished");

        Ok(())
    }

    /// Blocks until readiness is published.
    ///
    /// Returns `false` if the run was stopped first.
    pub fn wait_ready(&self) -> bool {
        self.spin_until(|| self.ready.load(Ordering::Acquire))
    }

    /// Whether measurement has started.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Asks all workers to stop after their current operation.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.notify();
    }

    /// Whether the run has been stopped.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// How long the warm-up took, once the node is ready.
    pub fn warmup_time(&self) -> Duration {
        Duration::from_nanos(self.warmup_nanos.load(Ordering::Relaxed))
    }

    /// Wakes up all parked waiters.
    fn notify(&self) {
        // Taking the lock orders the notification after a waiter's last check of its condition.
        drop(self.lock.lock().unwrap_or_else(PoisonError::into_inner));
        self.wakeup.notify_all();
    }

    /// Blocks until `condition` holds or the run is stopped. Returns whether `condition` holds.
    fn spin_until(&self, condition: impl Fn() -> bool) -> bool {
        for _ in 0..SPINS_BEFORE_PARK {
            if condition() {
                return true;
            }
            if self.stop.load(Ordering::Acquire) {
                return false;
            }
            hint::spin_loop();
        }

        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if condition() {
                return true;
            }
            if self.stop.load(Ordering::Acquire) {
                return false;
            }
            guard = self
                .wakeup
                .wait_timeout(guard, PARK_TIMEOUT)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use dsmbench_fabric::{LocalFabric, LocalNode};

    use super::*;

    fn stats(threads: usize) -> Vec<WorkerStats> {
        (0..threads).map(|_| WorkerStats::new(16)).collect()
    }

    #[test]
    fn phases_in_order() {
        let fabric = LocalFabric::new(1);
        let node = fabric.node(0).unwrap();
        let coordinator = Coordinator::new(1);
        let stats = stats(1);
        stats[0].record(Duration::from_nanos(10));

        assert_eq!(coordinator.phase(), Phase::Init);
        let started = coordinator.begin_warmup();
        assert_eq!(coordinator.phase(), Phase::Warming);

        coordinator.finish_warmup();
        assert_eq!(coordinator.finished(), 1);

        coordinator.synchronize(&node, &stats, started).unwrap();
        assert_eq!(coordinator.phase(), Phase::Ready);
        assert!(coordinator.is_ready());
        assert!(coordinator.wait_ready());
        assert_eq!(coordinator.finished(), 0);
        assert_eq!(stats[0].ops(), 0);
    }

    #[test]
    fn nobody_is_ready_before_all_workers_finished() {
        let fabric = LocalFabric::new(1);
        let node = fabric.node(0).unwrap();
        let coordinator = Coordinator::new(4);
        let stats = stats(4);
        let observed = Mutex::new(Vec::new());

        thread::scope(|s| {
            for id in 0..4 {
                let (coordinator, node, stats) = (&coordinator, &node, &stats);
                let observed = &observed;
                s.spawn(move || {
                    let started = if id == 0 {
                        Some(coordinator.begin_warmup())
                    } else {
                        None
                    };
                    thread::sleep(Duration::from_millis(10 * id as u64));
                    coordinator.finish_warmup();

                    if let Some(started) = started {
                        coordinator.synchronize(node, stats, started).unwrap();
                    }

                    assert!(coordinator.wait_ready());
                    observed.lock().unwrap().push(coordinator.phase());
                });
            }
        });

        let observed = observed.into_inner().unwrap();
        assert_eq!(observed, vec![Phase::Ready; 4]);
    }

    #[test]
    fn nodes_meet_at_warm_finish() {
        let fabric = LocalFabric::new(2);
        let nodes: Vec<LocalNode> = fabric.nodes();

        thread::scope(|s| {
            for node in &nodes {
                s.spawn(move || {
                    let coordinator = Coordinator::new(1);
                    let stats = stats(1);
                    let started = coordinator.begin_warmup();
                    coordinator.finish_warmup();
                    coordinator.synchronize(node, &stats, started).unwrap();
                    assert_eq!(coordinator.phase(), Phase::Ready);
                });
            }
        });
    }

    #[test]
    fn barrier_timeout_stops_the_node() {
        let fabric = LocalFabric::with_timeout(2, Some(Duration::from_millis(50)));
        let node = fabric.node(0).unwrap();
        let coordinator = Coordinator::new(1);
        let started = coordinator.begin_warmup();
        coordinator.finish_warmup();

        let result = coordinator.synchronize(&node, &stats(1), started);
        assert!(result.is_err());
        assert!(coordinator.is_stopped());
        assert!(!coordinator.wait_ready());
        assert_eq!(coordinator.phase(), Phase::LocalDone);
    }

    #[test]
    fn stop_releases_waiters() {
        let coordinator = Coordinator::new(2);
        thread::scope(|s| {
            let waiter = s.spawn(|| coordinator.wait_ready());
            thread::sleep(Duration::from_millis(20));
            coordinator.stop();
            assert!(!waiter.join().unwrap());
        });
    }
}
