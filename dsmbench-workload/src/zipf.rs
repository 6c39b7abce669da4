//! Zipf-distributed rank generator.
//!
//! The generator follows J. Gray et al., *Quickly generating billion-record synthetic databases*
//! (SIGMOD 1994): after a one-time `O(n)` pass computing the normalization constant `zeta(n)`, each
//! sample costs one uniform draw and at most one call to [`pow_approx`].

use crate::error::WorkloadError;
use crate::math::pow_approx;

/// Skew above which [`pow_approx`] noticeably distorts the distribution.
const ACCURATE_THETA_LIMIT: f64 = 0.992;

/// Skew from which on every sample is rank zero.
const HOTTEST_THETA: f64 = 40.0;

/// A 48-bit linear congruential generator, using the constants of `drand48`.
///
/// This is not a good random number generator, but it is fast and sufficient to spread samples
/// over a distribution.
#[derive(Clone, Debug)]
pub struct Rand48 {
    state: u64,
}

impl Rand48 {
    /// All state bits.
    pub const MASK: u64 = (1 << 48) - 1;

    const MULTIPLIER: u64 = 0x5_DEEC_E66D;
    const INCREMENT: u64 = 0xB;

    /// Creates a generator from the lower 48 bits of `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed & Self::MASK,
        }
    }

    /// Returns a uniform sample in `[0, 1)`.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT)
            & Self::MASK;
        self.state as f64 / (1u64 << 48) as f64
    }
}

/// What the generator does, as decided by the skew parameter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    /// `theta == -1`: every rank in turn, wrapping around at `n`.
    Sequential,
    /// `theta == 0`: every rank is equally likely.
    Uniform,
    /// `0 < theta < 1`: Zipf distribution.
    Skewed,
    /// `theta >= 40`: always rank zero.
    Hottest,
}

/// Generates ranks in `[0, n)` following a Zipf distribution with skew `theta`.
///
/// Each worker thread owns one generator; the generator is not synchronized. Iterating over it
/// yields an endless sequence of ranks.
#[derive(Clone, Debug)]
pub struct ZipfGenerator {
    n: u64,
    theta: f64,
    mode: Mode,

    alpha: f64,
    threshold: f64,
    last_n: u64,
    dbl_n: f64,
    zetan: f64,
    eta: f64,

    rng: Rand48,
    cursor: u64,
}

impl ZipfGenerator {
    /// Creates a generator over `n` ranks.
    ///
    /// Supported values for `theta` are:
    ///
    /// - `-1`: iterate over all ranks in order, starting at `seed % n`
    /// - `0`: uniform distribution
    /// - `(0, 1)`: Zipf distribution; values above `0.992` lose accuracy
    /// - `>= 40`: always return rank zero
    ///
    /// Only the lower 48 bits of `seed` are used.
    pub fn new(n: u64, theta: f64, seed: u64) -> Result<Self, WorkloadError> {
        if n == 0 {
            return Err(WorkloadError::EmptyUniverse);
        }

        let mode = if theta == -1.0 {
            Mode::Sequential
        } else if theta == 0.0 {
            Mode::Uniform
        } else if theta > 0.0 && theta < 1.0 {
            Mode::Skewed
        } else if theta >= HOTTEST_THETA {
            Mode::Hottest
        } else {
            return Err(WorkloadError::UnsupportedTheta(theta));
        };

        if theta > ACCURATE_THETA_LIMIT && theta < 1.0 {
            tracing::warn!(theta, "theta > 0.992 will be inaccurate due to approximation");
        }

        let (alpha, threshold) = match mode {
            Mode::Skewed => (1.0 / (1.0 - theta), 1.0 + pow_approx(0.5, theta)),
            _ => (0.0, 0.0),
        };

        let seed = seed & Rand48::MASK;
        Ok(Self {
            n,
            theta,
            mode,
            alpha,
            threshold,
            last_n: 0,
            dbl_n: 0.0,
            zetan: 0.0,
            eta: 0.0,
            rng: Rand48::new(seed),
            cursor: seed % n,
        })
    }

    /// Derives a seed for a worker thread from a cycle counter reading.
    ///
    /// Mixing in the thread id keeps the streams of threads started at the same instant apart.
    pub fn thread_seed(cycles: u64, thread_id: u64) -> u64 {
        ((cycles & Rand48::MASK) ^ thread_id) & Rand48::MASK
    }

    /// Number of ranks.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Changes the number of ranks.
    ///
    /// The normalization constant is extended incrementally on the next sample when `n` grows,
    /// and recomputed from scratch when it shrinks.
    pub fn set_n(&mut self, n: u64) -> Result<(), WorkloadError> {
        if n == 0 {
            return Err(WorkloadError::EmptyUniverse);
        }

        self.n = n;
        Ok(())
    }

    /// Restarts the random stream from `seed`, keeping the normalization constants.
    pub fn reseed(&mut self, seed: u64) {
        let seed = seed & Rand48::MASK;
        self.rng = Rand48::new(seed);
        self.cursor = seed % self.n;
    }

    /// Draws the next rank.
    #[inline]
    pub fn next_rank(&mut self) -> u64 {
        if self.last_n != self.n {
            self.normalize();
        }

        match self.mode {
            Mode::Sequential => {
                if self.cursor >= self.n {
                    self.cursor = 0;
                }
                let rank = self.cursor;
                self.cursor += 1;
                rank
            }
            Mode::Uniform => {
                let u = self.rng.next_f64();
                ((self.dbl_n * u) as u64).min(self.n - 1)
            }
            Mode::Hottest => 0,
            Mode::Skewed => {
                let u = self.rng.next_f64();
                let uz = u * self.zetan;
                if uz < 1.0 {
                    0
                } else if uz < self.threshold {
                    1
                } else {
                    let rank = self.dbl_n * pow_approx(self.eta * (u - 1.0) + 1.0, self.alpha);
                    (rank as u64).min(self.n - 1)
                }
            }
        }
    }

    /// Brings the constants depending on `n` up to date.
    #[cold]
    fn normalize(&mut self) {
        if self.mode == Mode::Skewed {
            self.zetan = zeta(self.last_n, self.zetan, self.n, self.theta);
            self.eta = (1.0 - pow_approx(2.0 / self.n as f64, 1.0 - self.theta))
                / (1.0 - zeta(0, 0.0, 2, self.theta) / self.zetan);
        }

        self.last_n = self.n;
        self.dbl_n = self.n as f64;
    }
}

impl Iterator for ZipfGenerator {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        Some(self.next_rank())
    }
}

/// Computes `zeta(n) = sum(1 / i^theta)` for `i` in `1..=n`, continuing from `zeta(last_n)`.
fn zeta(last_n: u64, last_sum: f64, n: u64, theta: f64) -> f64 {
    let (mut i, mut sum) = if last_n > n {
        (0, 0.0)
    } else {
        (last_n, last_sum)
    };

    while i < n {
        sum += 1.0 / pow_approx(i as f64 + 1.0, theta);
        i += 1;
    }

    sum
}
