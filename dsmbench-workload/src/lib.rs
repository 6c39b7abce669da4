//! Request generation for benchmarking a shared index.
//!
//! A benchmark worker turns an endless stream of *ranks* into requests against the index:
//!
//! 1. The [`ZipfGenerator`] draws a rank in `[0, n)`. Low ranks are drawn more often the higher
//!    the configured skew is, which models a small set of hot keys.
//! 2. The [`KeyMapper`] hashes the rank onto the key space, so hot ranks end up on keys that are
//!    spread over the whole index instead of being clustered at its start.
//! 3. The [`RequestGenerator`] decides whether the request reads or writes the key.
//!
//! The generators favor speed over statistical perfection: the Zipf generator uses a 48-bit
//! linear congruential generator and an approximate power function, since producing a request
//! must stay cheap compared to executing it.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod error;
mod key;
mod math;
mod request;
mod zipf;

pub use crate::error::WorkloadError;
pub use crate::key::KeyMapper;
pub use crate::math::pow_approx;
pub use crate::request::{Action, Request, RequestGenerator, WRITE_VALUE};
pub use crate::zipf::{Rand48, ZipfGenerator};
