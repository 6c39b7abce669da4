use dsmbench_fabric::Index;

use crate::error::{BenchError, BenchResult};

/// Checks that the index stores, overwrites and deletes keys correctly.
///
/// Works on the raw keys `1..keys`: inserts `i -> 2i`, overwrites in reverse order with `3i`,
/// deletes everything and inserts `3i` again, checking every key after each round. Leaves the
/// keys `1..keys` mapped to `3i`.
pub fn check<I>(index: &I, keys: u64) -> BenchResult<()>
where
    I: Index + ?Sized,
{
    for key in 1..keys {
        index.insert(key, key * 2);
    }
    for key in (1..keys).rev() {
        index.insert(key, key * 3);
    }
    expect_all(index, keys, |key| Some(key * 3))?;

    for key in 1..keys {
        index.delete(key);
    }
    expect_all(index, keys, |_| None)?;

    for key in (1..keys).rev() {
        index.insert(key, key * 3);
    }
    expect_all(index, keys, |key| Some(key * 3))?;

    tracing::info!(keys, "index verification passed");
    Ok(())
}

fn expect_all<I>(index: &I, keys: u64, expected: impl Fn(u64) -> Option<u64>) -> BenchResult<()>
where
    I: Index + ?Sized,
{
    for key in 1..keys {
        let expected = expected(key);
        let actual = index.search(key);
        if actual != expected {
            return Err(BenchError::Verification {
                key,
                expected,
                actual,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use dsmbench_fabric::{CacheCounters, LocalFabric};

    use super::*;

    #[test]
    fn local_fabric_passes() {
        let fabric = LocalFabric::new(1);
        let node = fabric.node(0).unwrap();

        check(&node, 10_240).unwrap();
        assert_eq!(fabric.key_count(), 10_239);
        assert_eq!(fabric.get(7), Some(21));
    }

    /// An index that forgets deletes.
    #[derive(Debug, Default)]
    struct NoDelete(Mutex<HashMap<u64, u64>>);

    impl Index for NoDelete {
        fn insert(&self, key: u64, value: u64) {
            self.0.lock().unwrap().insert(key, value);
        }

        fn search(&self, key: u64) -> Option<u64> {
            self.0.lock().unwrap().get(&key).copied()
        }

        fn delete(&self, _key: u64) {}

        fn register_thread(&self) {}

        fn reset_thread(&self) {}

        fn collect_cache_statistics(&self) {}

        fn clear_statistics(&self) {}

        fn cache_counters(&self) -> CacheCounters {
            CacheCounters::default()
        }
    }

    #[test]
    fn detects_lost_deletes() {
        let err = check(&NoDelete::default(), 100).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Verification {
                key: 1,
                expected: None,
                actual: Some(3),
            }
        ));
    }
}
