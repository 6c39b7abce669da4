use xxhash_rust::xxh3::xxh3_64;

use crate::error::WorkloadError;

/// Maps sequence numbers onto a bounded key space.
///
/// Every input is hashed with a 64-bit fingerprint before it is reduced to the key space, so that
/// consecutive sequence numbers land on unrelated keys. Keys are in `[1, key_space]`: `0` is never
/// produced and stays available as a sentinel for the index.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyMapper {
    key_space: u64,
}

impl KeyMapper {
    /// Creates a mapper for a key space of `key_space` distinct keys.
    pub fn new(key_space: u64) -> Result<Self, WorkloadError> {
        if key_space == 0 {
            return Err(WorkloadError::EmptyKeySpace);
        }

        Ok(Self { key_space })
    }

    /// Returns the key for sequence number `seq`.
    #[inline]
    pub fn map(&self, seq: u64) -> u64 {
        xxh3_64(&seq.to_le_bytes()) % self.key_space + 1
    }
}
