use std::fmt::Debug;

/// Keys stored in the shared index.
pub type Key = u64;

/// Values stored in the shared index.
pub type Value = u64;

/// Operations on the shared index, as seen from one node.
///
/// Implementations are shared by all worker threads of a node, so every method takes `&self`.
/// The per-thread hooks must be called from the thread they refer to.
pub trait Index: Debug + Send + Sync {
    /// Inserts or overwrites the value stored under `key`.
    fn insert(&self, key: Key, value: Value);

    /// Looks up `key`, returning `None` if it is not present.
    fn search(&self, key: Key) -> Option<Value>;

    /// Removes `key` from the index. Removing a missing key is a no-op.
    fn delete(&self, key: Key);

    /// Sets up the resources the calling thread needs to talk to the index.
    fn register_thread(&self);

    /// Releases the resources of the calling thread, so it can register again later.
    fn reset_thread(&self);

    /// Reports the index' internal cache statistics.
    fn collect_cache_statistics(&self);

    /// Resets all statistics kept by the index, including [`cache_counters`](Self::cache_counters).
    fn clear_statistics(&self);

    /// Returns the cache hits and misses observed by this node's threads since the last
    /// [`clear_statistics`](Self::clear_statistics).
    fn cache_counters(&self) -> CacheCounters;

    /// Returns the traffic this node has sent to remote memory so far.
    ///
    /// Unlike the cache counters, these are never cleared. Indexes that do not track their
    /// traffic report zeros.
    fn transport_counters(&self) -> TransportCounters {
        TransportCounters::default()
    }
}

/// Cache lookups observed by the index.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheCounters {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that had to go to remote memory.
    pub misses: u64,
}

impl CacheCounters {
    /// Returns `hits / (hits + misses)`, or `None` if there were no lookups at all.
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 / total as f64)
    }
}

impl std::ops::Add for CacheCounters {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            hits: self.hits + rhs.hits,
            misses: self.misses + rhs.misses,
        }
    }
}

/// Remote memory traffic caused by index operations.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TransportCounters {
    /// Remote reads issued.
    pub reads: u64,
    /// Bytes fetched by remote reads.
    pub read_bytes: u64,
    /// Remote writes issued.
    pub writes: u64,
    /// Bytes sent by remote writes.
    pub write_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_without_lookups() {
        assert_eq!(CacheCounters::default().hit_rate(), None);
    }

    #[test]
    fn hit_rate_is_a_ratio() {
        let counters = CacheCounters { hits: 3, misses: 1 } + CacheCounters { hits: 1, misses: 3 };
        assert_eq!(counters, CacheCounters { hits: 4, misses: 4 });
        assert_eq!(counters.hit_rate(), Some(0.5));
    }
}
