use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dsmbench_fabric::{CacheCounters, Cluster, FabricResult, Index};
use dsmbench_harness::bench;
use dsmbench_harness::config::Config;
use dsmbench_workload::KeyMapper;

/// A single-node index that records every insert.
#[derive(Debug, Default)]
struct RecordingIndex {
    inserts: Mutex<Vec<(u64, u64)>>,
    values: Mutex<HashMap<u64, u64>>,
    searches: AtomicU64,
}

impl Index for RecordingIndex {
    fn insert(&self, key: u64, value: u64) {
        self.inserts.lock().unwrap().push((key, value));
        self.values.lock().unwrap().insert(key, value);
    }

    fn search(&self, key: u64) -> Option<u64> {
        self.searches.fetch_add(1, Ordering::Relaxed);
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

impl Cluster for RecordingIndex {
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

fn read_only_config() -> Config {
    Config {
        node_count: 1,
        thread_count: 4,
        read_ratio: 100,
        key_space: 1000,
        warmup_ratio: 0.8,
        zipf_theta: 0.99,
        preload_keys: 0,
        report_interval: Duration::from_millis(10),
        duration: Some(Duration::from_millis(50)),
        latency_buckets: 1000,
        pin_threads: false,
        ..Default::default()
    }
}

#[test]
fn warmup_inserts_every_index_exactly_once() {
    dsmbench_test::tracing::init();

    let index = RecordingIndex::default();
    let summary = bench::run_node(&index, &read_only_config()).unwrap();

    let keys = KeyMapper::new(1000).unwrap();
    let mut inserts = index.inserts.into_inner().unwrap();
    for &(key, value) in &inserts {
        assert_eq!(key, keys.map(value / 2));
    }

    inserts.sort_by_key(|&(_, value)| value);
    let values: Vec<u64> = inserts.iter().map(|&(_, value)| value).collect();
    let expected: Vec<u64> = (1..800).map(|i| i * 2).collect();
    assert_eq!(values, expected);

    // Warm-up inserts are not measured, only the reads that followed.
    assert!(summary.ops > 0);
    assert_eq!(summary.ops, index.searches.load(Ordering::Relaxed));
    assert_eq!(summary.intervals, 5);
}

#[test]
fn preload_and_writes() {
    let config = Config {
        read_ratio: 0,
        preload_keys: 50,
        warmup_ratio: 0.0,
        ..read_only_config()
    };

    let index = RecordingIndex::default();
    let summary = bench::run_node(&index, &config).unwrap();

    let inserts = index.inserts.into_inner().unwrap();
    let keys = KeyMapper::new(1000).unwrap();
    for (seq, &(key, value)) in (1..=50).zip(&inserts) {
        assert_eq!((key, value), (keys.map(seq), seq * 2));
    }

    // Everything after the preload is a measured write.
    let writes = &inserts[50..];
    assert_eq!(writes.len() as u64, summary.ops);
    assert!(writes.iter().all(|&(_, value)| value == 12));
    assert_eq!(index.searches.load(Ordering::Relaxed), 0);
}

#[test]
fn verification_runs_on_node_zero() {
    let config = Config {
        verify: true,
        verify_keys: 100,
        ..read_only_config()
    };

    let index = RecordingIndex::default();
    let summary = bench::run_node(&index, &config).unwrap();

    let inserts = index.inserts.into_inner().unwrap();
    let initial: Vec<(u64, u64)> = (1..100).map(|key| (key, key * 2)).collect();
    let overwrites: Vec<(u64, u64)> = (1..100).rev().map(|key| (key, key * 3)).collect();
    assert_eq!(inserts[..99], initial[..]);
    assert_eq!(inserts[99..198], overwrites[..]);
    assert_eq!(inserts[198..297], overwrites[..]);

    // Three rounds of lookups over 99 keys happen before measurement starts.
    assert_eq!(summary.ops, index.searches.load(Ordering::Relaxed) - 3 * 99);
}
