use std::time::Duration;

use thiserror::Error;

/// Errors raised by the cluster collectives.
///
/// Index operations never fail: a missing key is reported as `None` by [`Index::search`].
///
/// [`Index::search`]: crate::Index::search
#[derive(Debug, Error)]
pub enum FabricError {
    /// Not every node arrived at a collective within the configured timeout.
    #[error("collective `{tag}` timed out after {waited:?} ({arrived}/{expected} nodes arrived)")]
    Timeout {
        /// The barrier tag, or `sum` for the all-reduce.
        tag: String,
        /// How long this node waited before giving up.
        waited: Duration,
        /// Number of nodes that had arrived, including this one.
        arrived: usize,
        /// Number of nodes in the cluster.
        expected: usize,
    },

    /// The cluster was shut down while this node waited at a collective, or before it arrived.
    #[error("cluster shut down during collective `{tag}`")]
    ShutDown {
        /// The barrier tag, or `sum` for the all-reduce.
        tag: String,
    },

    /// A node id outside of the cluster was requested.
    #[error("node {node} is not part of a cluster of {size} nodes")]
    UnknownNode {
        /// The requested node id.
        node: usize,
        /// Number of nodes in the cluster.
        size: usize,
    },
}

/// Result type for fabric operations.
pub type FabricResult<T> = Result<T, FabricError>;
