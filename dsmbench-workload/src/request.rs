use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::WorkloadError;
use crate::key::KeyMapper;
use crate::zipf::ZipfGenerator;

/// The value written by every write request of the measurement phase.
pub const WRITE_VALUE: u64 = 12;

/// Whether a request reads or writes its key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// Look up the key.
    Read,
    /// Insert or overwrite the key.
    Write,
}

/// A single operation against the index.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Request {
    /// The key to operate on, in `[1, key_space]`.
    pub key: u64,
    /// The value to store for writes.
    pub value: u64,
    /// Read or write.
    pub action: Action,
}

/// Turns Zipf-distributed ranks into a stream of reads and writes.
#[derive(Debug)]
pub struct RequestGenerator {
    zipf: ZipfGenerator,
    keys: KeyMapper,
    read_ratio: u8,
    rng: SmallRng,
}

impl RequestGenerator {
    /// Creates a generator issuing `read_ratio` percent reads.
    pub fn new(
        zipf: ZipfGenerator,
        keys: KeyMapper,
        read_ratio: u8,
        seed: u64,
    ) -> Result<Self, WorkloadError> {
        if read_ratio > 100 {
            return Err(WorkloadError::ReadRatio(read_ratio));
        }

        Ok(Self {
            zipf,
            keys,
            read_ratio,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Produces the next request.
    #[inline]
    pub fn next_request(&mut self) -> Request {
        let key = self.keys.map(self.zipf.next_rank());
        let action = if self.rng.random_range(0..100u8) < self.read_ratio {
            Action::Read
        } else {
            Action::Write
        };

        Request {
            key,
            value: WRITE_VALUE,
            action,
        }
    }
}

impl Iterator for RequestGenerator {
    type Item = Request;

    fn next(&mut self) -> Option<Request> {
        Some(self.next_request())
    }
}
