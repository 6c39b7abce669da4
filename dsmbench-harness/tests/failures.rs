use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use dsmbench_fabric::{CacheCounters, Cluster, FabricResult, Index};
use dsmbench_harness::bench;
use dsmbench_harness::config::Config;
use dsmbench_harness::error::BenchError;

/// A single-node index whose lookups start panicking after a while.
#[derive(Debug)]
struct FailingIndex {
    values: Mutex<HashMap<u64, u64>>,
    searches: AtomicU64,
    healthy_searches: u64,
}

impl FailingIndex {
    fn new(healthy_searches: u64) -> Self {
        Self {
            values: Mutex::default(),
            searches: AtomicU64::new(0),
            healthy_searches,
        }
    }
}

impl Index for FailingIndex {
    fn insert(&self, key: u64, value: u64) {
        self.values.lock().unwrap().insert(key, value);
    }

    fn search(&self, key: u64) -> Option<u64> {
        let searches = self.searches.fetch_add(1, Ordering::Relaxed) + 1;
        if searches > self.healthy_searches {
            panic!("lost connection to remote memory");
        }
        self.values.lock().unwrap().get(&key).copied()
    }

    fn delete(&self, key: u64) {
        self.values.lock().unwrap().remove(&key);
    }

    fn register_thread(&self) {}

    fn reset_thread(&self) {}

    fn collect_cache_statistics(&self) {}

    fn clear_statistics(&self) {}

    fn cache_counters(&self) -> CacheCounters {
        CacheCounters::default()
    }
}

impl Cluster for FailingIndex {
    fn node_id(&self) -> usize {
        0
    }

    fn cluster_size(&self) -> usize {
        1
    }

    fn barrier(&self, _tag: &str) -> FabricResult<()> {
        Ok(())
    }

    fn sum(&self, value: u64) -> FabricResult<u64> {
        Ok(value)
    }
}

#[test]
fn worker_panic_ends_an_unbounded_run() {
    dsmbench_test::tracing::init();

    let config = Config {
        node_count: 1,
        thread_count: 2,
        read_ratio: 100,
        key_space: 1000,
        warmup_ratio: 0.5,
        preload_keys: 0,
        report_interval: Duration::from_millis(10),
        duration: None,
        latency_buckets: 1000,
        pin_threads: false,
        ..Default::default()
    };
    let index = Arc::new(FailingIndex::new(1000));

    let (sender, receiver) = mpsc::channel();
    let runner = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            sender.send(bench::run_node(&*index, &config)).ok();
        })
    };

    let result = receiver
        .recv_timeout(Duration::from_secs(10))
        .expect("run kept going after a worker panicked");
    assert!(
        matches!(result, Err(BenchError::WorkerPanicked { node: 0, .. })),
        "unexpected result: {result:?}"
    );
    runner.join().unwrap();
}
