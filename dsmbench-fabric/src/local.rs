//! In-process fabric.
//!
//! [`LocalFabric`] simulates a cluster inside a single process: all nodes share one sharded
//! in-memory index, and the collectives are implemented with a mutex and a condition variable.
//! Each simulated node is handed out as a [`LocalNode`], which implements both [`Index`] and
//! [`Cluster`] and is meant to be driven from its own thread.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::cluster::Cluster;
use crate::error::{FabricError, FabricResult};
use crate::index::{CacheCounters, Index, Key, TransportCounters, Value};

/// Number of independently locked shards of the in-memory index.
const SHARDS: usize = 64;

/// Bytes moved by a single read or write of an index entry.
const ENTRY_BYTES: u64 = (mem::size_of::<Key>() + mem::size_of::<Value>()) as u64;

type Shard = Mutex<HashMap<Key, Value>>;

#[derive(Debug)]
struct Store {
    shards: Box<[Shard]>,
}

impl Store {
    fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::default()).collect(),
        }
    }

    fn shard(&self, key: Key) -> &Shard {
        &self.shards[(key % SHARDS as u64) as usize]
    }

    fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap().len())
            .sum()
    }
}

/// Per-node bookkeeping of the simulated index.
#[derive(Debug, Default)]
struct NodeStats {
    hits: AtomicU64,
    misses: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    threads: AtomicUsize,
}

/// The collective operations a node can wait on.
enum Op<'a> {
    Barrier(&'a str),
    Sum,
}

impl fmt::Display for Op<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Barrier(tag) => f.write_str(tag),
            Op::Sum => f.write_str("sum"),
        }
    }
}

/// One collective round: nodes arrive, the last one completes the round for everybody.
#[derive(Debug, Default)]
struct Round {
    arrived: usize,
    generation: u64,
    partial: u64,
    result: u64,
}

#[derive(Debug, Default)]
struct Collectives {
    barriers: HashMap<String, Round>,
    sum: Round,
    shut_down: bool,
}

impl Collectives {
    fn round(&mut self, op: &Op<'_>) -> &mut Round {
        match op {
            Op::Barrier(tag) => self.barriers.entry((*tag).to_owned()).or_default(),
            Op::Sum => &mut self.sum,
        }
    }
}

#[derive(Debug)]
struct Rendezvous {
    size: usize,
    timeout: Option<Duration>,
    state: Mutex<Collectives>,
    cond: Condvar,
}

impl Rendezvous {
    /// Contributes `value` to the current round of `op` and waits for all other nodes.
    ///
    /// Returns the sum of all contributions of the round.
    fn arrive(&self, op: Op<'_>, value: u64) -> FabricResult<u64> {
        let mut state = self.state.lock().unwrap();
        if state.shut_down {
            return Err(FabricError::ShutDown {
                tag: op.to_string(),
            });
        }

        let round = state.round(&op);
        round.arrived += 1;
        round.partial += value;
        let generation = round.generation;

        if round.arrived == self.size {
            round.result = round.partial;
            round.partial = 0;
            round.arrived = 0;
            round.generation += 1;
            self.cond.notify_all();
            return Ok(round.result);
        }

        let pending =
            |state: &mut Collectives| !state.shut_down && state.round(&op).generation == generation;
        let mut state = match self.timeout {
            None => self.cond.wait_while(state, pending).unwrap(),
            Some(timeout) => {
                let (mut state, wait) = self
                    .cond
                    .wait_timeout_while(state, timeout, pending)
                    .unwrap();
                if wait.timed_out() {
                    // Withdraw, so a later attempt does not complete the round with stale data.
                    let round = state.round(&op);
                    let arrived = round.arrived;
                    round.arrived -= 1;
                    round.partial -= value;
                    return Err(FabricError::Timeout {
                        tag: op.to_string(),
                        waited: timeout,
                        arrived,
                        expected: self.size,
                    });
                }
                state
            }
        };

        let round = state.round(&op);
        if round.generation == generation {
            return Err(FabricError::ShutDown {
                tag: op.to_string(),
            });
        }
        Ok(round.result)
    }

    fn shut_down(&self) {
        self.state.lock().unwrap().shut_down = true;
        self.cond.notify_all();
    }
}

/// An in-process cluster of simulated nodes sharing one in-memory index.
///
/// The fabric is cheap to clone; all clones refer to the same index and collectives.
#[derive(Clone, Debug)]
pub struct LocalFabric {
    store: Arc<Store>,
    rendezvous: Arc<Rendezvous>,
    nodes: Arc<[Arc<NodeStats>]>,
}

impl LocalFabric {
    /// Creates a cluster of `nodes` simulated nodes whose collectives wait forever.
    ///
    /// # Panics
    ///
    /// Panics if `nodes` is zero.
    pub fn new(nodes: usize) -> Self {
        Self::with_timeout(nodes, None)
    }

    /// Creates a cluster of `nodes` simulated nodes.
    ///
    /// With a `timeout`, a node that waits longer than that at a collective gives up with
    /// [`FabricError::Timeout`] instead of hanging.
    ///
    /// # Panics
    ///
    /// Panics if `nodes` is zero.
    pub fn with_timeout(nodes: usize, timeout: Option<Duration>) -> Self {
        assert!(nodes > 0, "a cluster needs at least one node");

        Self {
            store: Arc::new(Store::new()),
            rendezvous: Arc::new(Rendezvous {
                size: nodes,
                timeout,
                state: Mutex::default(),
                cond: Condvar::new(),
            }),
            nodes: (0..nodes).map(|_| Arc::default()).collect(),
        }
    }

    /// Number of simulated nodes.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the handle of node `id`.
    pub fn node(&self, id: usize) -> FabricResult<LocalNode> {
        let stats = self.nodes.get(id).ok_or(FabricError::UnknownNode {
            node: id,
            size: self.size(),
        })?;

        Ok(LocalNode {
            id,
            stats: Arc::clone(stats),
            fabric: self.clone(),
        })
    }

    /// Returns the handles of all nodes, ordered by node id.
    pub fn nodes(&self) -> Vec<LocalNode> {
        (0..self.size())
            .map(|id| LocalNode {
                id,
                stats: Arc::clone(&self.nodes[id]),
                fabric: self.clone(),
            })
            .collect()
    }

    /// Returns the value stored under `key`, bypassing cache accounting.
    pub fn get(&self, key: Key) -> Option<Value> {
        self.store.shard(key).lock().unwrap().get(&key).copied()
    }

    /// Returns the number of keys stored in the index.
    pub fn key_count(&self) -> usize {
        self.store.len()
    }

    /// Shuts the cluster down.
    ///
    /// Every node waiting at a collective is released with [`FabricError::ShutDown`], and so is
    /// every later call to a collective. The index itself stays usable.
    pub fn shutdown(&self) {
        tracing::debug!("shutting down local fabric");
        self.rendezvous.shut_down();
    }
}

/// A simulated node of a [`LocalFabric`].
#[derive(Clone, Debug)]
pub struct LocalNode {
    id: usize,
    stats: Arc<NodeStats>,
    fabric: LocalFabric,
}

impl LocalNode {
    /// Number of threads currently registered with the index on this node.
    pub fn registered_threads(&self) -> usize {
        self.stats.threads.load(Ordering::Relaxed)
    }
}

impl Index for LocalNode {
    fn insert(&self, key: Key, value: Value) {
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.fabric.store.shard(key).lock().unwrap().insert(key, value);
    }

    fn search(&self, key: Key) -> Option<Value> {
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        let value = self.fabric.get(key);

        // There is no remote tier behind the in-memory index, so a lookup either hits or misses
        // on a key that does not exist anywhere.
        let counter = match value {
            Some(_) => &self.stats.hits,
            None => &self.stats.misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        value
    }

    fn delete(&self, key: Key) {
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.fabric.store.shard(key).lock().unwrap().remove(&key);
    }

    fn register_thread(&self) {
        let threads = self.stats.threads.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(node = self.id, threads, "registered thread");
    }

    fn reset_thread(&self) {
        let _ = self
            .stats
            .threads
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        tracing::trace!(node = self.id, "reset thread");
    }

    fn collect_cache_statistics(&self) {
        let CacheCounters { hits, misses } = self.cache_counters();
        tracing::info!(
            node = self.id,
            hits,
            misses,
            keys = self.fabric.key_count(),
            "index cache statistics"
        );
    }

    fn clear_statistics(&self) {
        self.stats.hits.store(0, Ordering::Relaxed);
        self.stats.misses.store(0, Ordering::Relaxed);
    }

    fn cache_counters(&self) -> CacheCounters {
        CacheCounters {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
        }
    }

    fn transport_counters(&self) -> TransportCounters {
        let reads = self.stats.reads.load(Ordering::Relaxed);
        let writes = self.stats.writes.load(Ordering::Relaxed);
        TransportCounters {
            reads,
            read_bytes: reads * ENTRY_BYTES,
            writes,
            write_bytes: writes * ENTRY_BYTES,
        }
    }
}

impl Cluster for LocalNode {
    fn node_id(&self) -> usize {
        self.id
    }

    fn cluster_size(&self) -> usize {
        self.fabric.size()
    }

    fn barrier(&self, tag: &str) -> FabricResult<()> {
        self.fabric.rendezvous.arrive(Op::Barrier(tag), 0)?;
        Ok(())
    }

    fn sum(&self, value: u64) -> FabricResult<u64> {
        self.fabric.rendezvous.arrive(Op::Sum, value)
    }
}
