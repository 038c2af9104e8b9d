use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::NodeId;

/// Shape of the physical links between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topology {
    /// Every pair shares a direct link
    Full,
    /// Node i links to i-1 and i+1 modulo N
    Ring,
    /// Topology node 0 is the hub, every other node a leaf
    Star,
    /// Node j > 0 hangs below node (j - 1) / branch_factor
    Tree { branch_factor: usize },
}

impl Default for Topology {
    fn default() -> Self {
        Topology::Full
    }
}

impl Topology {
    /// Whether `i` and `j` share a direct, single-hop link
    pub fn is_adjacent(&self, i: NodeId, j: NodeId, node_count: usize) -> bool {
        if i == j || i >= node_count || j >= node_count {
            return false;
        }
        match self {
            Topology::Full => true,
            Topology::Ring => (i + 1) % node_count == j || (j + 1) % node_count == i,
            Topology::Star => i == 0 || j == 0,
            Topology::Tree { branch_factor } => {
                let branch_factor = *branch_factor;
                if branch_factor == 0 {
                    return false;
                }
                let parent = |child: NodeId| (child - 1) / branch_factor;
                (j > 0 && parent(j) == i) || (i > 0 && parent(i) == j)
            }
        }
    }

    /// All-pairs hop distances (Floyd–Warshall). `None` marks an unreachable pair.
    pub fn hop_distances(&self, node_count: usize) -> Vec<Vec<Option<usize>>> {
        let mut dist = vec![vec![None; node_count]; node_count];
        for i in 0..node_count {
            dist[i][i] = Some(0);
            for j in 0..node_count {
                if self.is_adjacent(i, j, node_count) {
                    dist[i][j] = Some(1);
                }
            }
        }
        for k in 0..node_count {
            for i in 0..node_count {
                let Some(ik) = dist[i][k] else { continue };
                for j in 0..node_count {
                    let Some(kj) = dist[k][j] else { continue };
                    let through = ik + kj;
                    if dist[i][j].map_or(true, |current| through < current) {
                        dist[i][j] = Some(through);
                    }
                }
            }
        }
        dist
    }

    /// Clockwise and counter-clockwise hop counts between two ring positions
    pub fn ring_paths(i: NodeId, j: NodeId, node_count: usize) -> (usize, usize) {
        let clockwise = (j + node_count - i) % node_count;
        (clockwise, node_count - clockwise)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Full => write!(f, "full"),
            Topology::Ring => write!(f, "ring"),
            Topology::Star => write!(f, "star"),
            Topology::Tree { branch_factor } => write!(f, "tree({})", branch_factor),
        }
    }
}
