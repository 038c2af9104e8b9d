use serde::{Deserialize, Serialize};

use crate::consensus::NodeRuntimeState;

/// Thresholds of one session, shared by the simulator and the probability engine.
///
/// Both per-node thresholds count messages from *other* nodes only:
/// `2f` prepares (the node's own vote makes `2f + 1`) and `2f` commits.
/// The proposer never sends `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumRule {
    node_count: usize,
}

impl QuorumRule {
    pub fn new(node_count: usize) -> Self {
        Self { node_count }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// `f = floor((N - 1) / 3)`
    pub fn fault_tolerance(&self) -> usize {
        self.node_count.saturating_sub(1) / 3
    }

    /// `N - f`, the size every phase set must reach
    pub fn success_threshold(&self) -> usize {
        self.node_count - self.fault_tolerance()
    }

    /// Prepares from other nodes a replica needs to become prepared
    pub fn prepare_threshold(&self) -> usize {
        2 * self.fault_tolerance()
    }

    /// Commits from other nodes a prepared replica needs to commit
    pub fn commit_threshold(&self) -> usize {
        2 * self.fault_tolerance()
    }

    pub fn is_prepared(&self, node: &NodeRuntimeState) -> bool {
        node.received_pre_prepare && node.received_prepare_count >= self.prepare_threshold()
    }

    pub fn is_committed(&self, node: &NodeRuntimeState) -> bool {
        self.is_prepared(node) && node.received_commit_count >= self.commit_threshold()
    }

    /// `(|V_pp|, |V_p|, |V_c|)` for the given node states
    pub fn membership(&self, nodes: &[NodeRuntimeState]) -> Membership {
        Membership {
            pre_prepared: nodes.iter().filter(|n| n.received_pre_prepare).count(),
            prepared: nodes.iter().filter(|n| self.is_prepared(n)).count(),
            committed: nodes.iter().filter(|n| self.is_committed(n)).count(),
        }
    }
}

/// Sizes of the three phase sets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub pre_prepared: usize,
    pub prepared: usize,
    pub committed: usize,
}
