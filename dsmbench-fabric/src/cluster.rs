use std::fmt::Debug;

use crate::error::FabricResult;

/// Cluster membership and the collectives shared by all nodes.
///
/// Both collectives are blocking all-or-nothing operations: a call only returns once every node
/// of the cluster has issued the matching call.
pub trait Cluster: Debug + Send + Sync {
    /// The id of the local node, in `0..cluster_size()`.
    fn node_id(&self) -> usize;

    /// The number of nodes in the cluster.
    fn cluster_size(&self) -> usize;

    /// Blocks until every node has called `barrier` with the same `tag`.
    fn barrier(&self, tag: &str) -> FabricResult<()>;

    /// Blocks until every node has contributed a value and returns the sum over all nodes.
    fn sum(&self, value: u64) -> FabricResult<u64>;

    /// Whether this node reports cluster-wide figures.
    ///
    /// This is the node with the lowest id.
    fn is_coordinator(&self) -> bool {
        self.node_id() == 0
    }
}
