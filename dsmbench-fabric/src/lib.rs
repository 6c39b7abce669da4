//! The seam between the benchmark harness and the shared index it drives.
//!
//! The index itself, its remote-memory transport and cluster membership live outside of this
//! workspace. The harness only ever talks to them through the two traits defined here:
//!
//! - [`Index`]: key/value operations against the shared index, plus the per-thread setup and the
//!   cache statistics the index keeps about itself.
//! - [`Cluster`]: identity of the local node and the blocking collectives (`barrier` and `sum`)
//!   that every node has to participate in.
//!
//! [`LocalFabric`] implements both traits in-process. It simulates any number of nodes that share
//! one sharded in-memory index, which is what the `dsmbench` binary and all tests run against.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod cluster;
mod error;
mod index;
mod local;

pub use cluster::Cluster;
pub use error::{FabricError, FabricResult};
pub use index::{CacheCounters, Index, Key, TransportCounters, Value};
pub use local::{LocalFabric, LocalNode};
