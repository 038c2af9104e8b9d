//! Link reliability model.
//!
//! Decides whether a single transmission from node i to node j gets through, and
//! exposes the same behavior as an `N×N` matrix of single-attempt success
//! probabilities for the probability engine. Both views are derived from one
//! place per pair so they can never disagree.

use rand::Rng;
use rand_distr::{Bernoulli, Distribution};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::NodeId;

pub mod topology;
pub use topology::Topology;


/// sender -> (target -> probability)
pub type SenderOverrides = BTreeMap<NodeId, BTreeMap<NodeId, f64>>;

#[derive(Debug, Error, PartialEq)]
pub enum ReliabilityError {
    #[error("Probability {0} is outside [0, 1]")]
    InvalidProbability(f64),
    #[error("Reliability matrix must be {expected}x{expected}, got a row of length {found} at row {row}")]
    RowMismatch { expected: usize, row: usize, found: usize },
    #[error("Reliability matrix must have {expected} rows, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Node {node} is out of range for {node_count} nodes")]
    NodeOutOfRange { node: NodeId, node_count: usize },
    #[error("Tree topology needs a branch factor of at least 1")]
    InvalidBranchFactor,
}

fn check_probability(value: f64) -> Result<f64, ReliabilityError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ReliabilityError::InvalidProbability(value))
    }
}

// ------------------------------------------------------------------------------------------------
// Reliability Matrix
// ------------------------------------------------------------------------------------------------

/// Square table of per-pair single-attempt success probabilities.
/// The diagonal is ignored; a node always "reaches" itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReliabilityMatrix(Vec<Vec<f64>>);

impl ReliabilityMatrix {
    /// Validate a square matrix with entries in [0, 1]
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self, ReliabilityError> {
        let n = rows.len();
        for (row, entries) in rows.iter().enumerate() {
            if entries.len() != n {
                return Err(ReliabilityError::RowMismatch { expected: n, row, found: entries.len() });
            }
            for &value in entries {
                check_probability(value)?;
            }
        }
        Ok(Self(rows))
    }

    /// Matrix with `p` on every off-diagonal entry
    pub fn uniform(node_count: usize, p: f64) -> Result<Self, ReliabilityError> {
        check_probability(p)?;
        let rows = (0..node_count)
            .map(|i| (0..node_count).map(|j| if i == j { 1.0 } else { p }).collect())
            .collect();
        Ok(Self(rows))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// Reject a matrix whose size does not match the session
    pub fn ensure_dimension(&self, node_count: usize) -> Result<(), ReliabilityError> {
        if self.dimension() != node_count {
            return Err(ReliabilityError::DimensionMismatch { expected: node_count, found: self.dimension() });
        }
        Ok(())
    }

    pub fn get(&self, from: NodeId, to: NodeId) -> f64 {
        if from == to {
            1.0
        } else {
            self.0[from][to]
        }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.0
    }

    /// The shared off-diagonal value if every pair is equally reliable
    pub fn uniform_value(&self) -> Option<f64> {
        let n = self.dimension();
        let mut shared: Option<f64> = None;
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let value = self.0[i][j];
                match shared {
                    None => shared = Some(value),
                    Some(existing) if (existing - value).abs() > 1e-12 => return None,
                    Some(_) => {}
                }
            }
        }
        // a single node has no pairs at all; any p describes it
        Some(shared.unwrap_or(1.0))
    }
}

// ------------------------------------------------------------------------------------------------
// Link Model
// ------------------------------------------------------------------------------------------------

/// How one ordered pair is sampled
#[derive(Debug, Clone, Copy, PartialEq)]
enum Link {
    /// One trial with an explicit probability (custom matrix or override)
    Direct(f64),
    /// All `hops` link trials must succeed
    Path { hops: usize },
    /// Either of two independent hop paths must succeed (ring)
    EitherPath { first: usize, second: usize },
    Unreachable,
}

/// Decides transmission success for every ordered pair of a session
#[derive(Debug, Clone)]
pub struct ReliabilityModel {
    node_count: usize,
    topology: Topology,
    /// Per-hop probability of topology-routed links
    link_probability: f64,
    /// Every link was taken from a custom matrix
    custom: bool,
    hop: Bernoulli,
    /// Pre-computed per pair, indexed `[from][to]`
    links: Vec<Vec<Link>>,
}

impl ReliabilityModel {
    /// Build the topology-derived model with uniform per-hop probability `p`
    pub fn new(node_count: usize, topology: Topology, p: f64) -> Result<Self, ReliabilityError> {
        let p = check_probability(p)?;
        if matches!(topology, Topology::Tree { branch_factor: 0 }) {
            return Err(ReliabilityError::InvalidBranchFactor);
        }
        let hop = Bernoulli::new(p).map_err(|_| ReliabilityError::InvalidProbability(p))?;
        let links = Self::route_links(node_count, topology);
        tracing::debug!("Reliability model for {} nodes on {} topology with p={}", node_count, topology, p);
        Ok(Self { node_count, topology, link_probability: p, custom: false, hop, links })
    }

    /// A model whose pairs are exactly the entries of `matrix`
    pub fn from_matrix(matrix: &ReliabilityMatrix) -> Result<Self, ReliabilityError> {
        let node_count = matrix.dimension();
        let link_probability = matrix.uniform_value().unwrap_or(1.0);
        let hop = Bernoulli::new(link_probability)
            .map_err(|_| ReliabilityError::InvalidProbability(link_probability))?;
        let links = (0..node_count)
            .map(|i| (0..node_count).map(|j| Link::Direct(matrix.get(i, j))).collect())
            .collect();
        Ok(Self { node_count, topology: Topology::Full, link_probability, custom: true, hop, links })
    }

    /// Replace the topology-derived behavior with a custom matrix
    pub fn with_custom_matrix(self, matrix: &ReliabilityMatrix) -> Result<Self, ReliabilityError> {
        matrix.ensure_dimension(self.node_count)?;
        let mut model = Self::from_matrix(matrix)?;
        model.topology = self.topology;
        Ok(model)
    }

    /// Apply per-sender overrides. They win over every other source for their pair.
    pub fn with_overrides(mut self, overrides: &SenderOverrides) -> Result<Self, ReliabilityError> {
        for (&from, targets) in overrides {
            self.check_node(from)?;
            for (&to, &probability) in targets {
                self.check_node(to)?;
                let probability = check_probability(probability)?;
                if from != to {
                    self.links[from][to] = Link::Direct(probability);
                }
            }
        }
        Ok(self)
    }

    fn check_node(&self, node: NodeId) -> Result<(), ReliabilityError> {
        if node >= self.node_count {
            return Err(ReliabilityError::NodeOutOfRange { node, node_count: self.node_count });
        }
        Ok(())
    }

    fn route_links(node_count: usize, topology: Topology) -> Vec<Vec<Link>> {
        let distances = match topology {
            Topology::Tree { .. } => Some(topology.hop_distances(node_count)),
            _ => None,
        };
        let mut links = vec![vec![Link::Path { hops: 0 }; node_count]; node_count];
        for i in 0..node_count {
            for j in 0..node_count {
                if i == j {
                    continue;
                }
                links[i][j] = match topology {
                    Topology::Full => Link::Path { hops: 1 },
                    Topology::Ring => {
                        if topology.is_adjacent(i, j, node_count) {
                            Link::Path { hops: 1 }
                        } else {
                            let (first, second) = Topology::ring_paths(i, j, node_count);
                            Link::EitherPath { first, second }
                        }
                    }
                    Topology::Star => {
                        if i == 0 || j == 0 {
                            Link::Path { hops: 1 }
                        } else {
                            Link::Path { hops: 2 }
                        }
                    }
                    Topology::Tree { .. } => match distances.as_ref().and_then(|d| d[i][j]) {
                        Some(hops) => Link::Path { hops },
                        None => Link::Unreachable,
                    },
                };
            }
        }
        links
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Per-hop probability the topology routes with, `None` once a custom
    /// matrix has replaced every link
    pub fn link_probability(&self) -> Option<f64> {
        if self.custom {
            None
        } else {
            Some(self.link_probability)
        }
    }

    fn path_succeeds<R: Rng + ?Sized>(&self, hops: usize, rng: &mut R) -> bool {
        (0..hops).all(|_| self.hop.sample(rng))
    }

    /// Attempt one transmission from `from` to `to`
    pub fn attempt<R: Rng + ?Sized>(&self, from: NodeId, to: NodeId, rng: &mut R) -> bool {
        if from == to {
            return true;
        }
        match self.links[from][to] {
            Link::Direct(probability) => rng.gen_bool(probability),
            Link::Path { hops } => self.path_succeeds(hops, rng),
            Link::EitherPath { first, second } => {
                // both paths are always sampled, they are independent trials
                let clockwise = self.path_succeeds(first, rng);
                let counter_clockwise = self.path_succeeds(second, rng);
                clockwise || counter_clockwise
            }
            Link::Unreachable => false,
        }
    }

    /// Single-attempt success probability of the pair, consistent with `attempt`
    pub fn reliability(&self, from: NodeId, to: NodeId) -> f64 {
        if from == to {
            return 1.0;
        }
        let p = self.link_probability;
        match self.links[from][to] {
            Link::Direct(probability) => probability,
            Link::Path { hops } => p.powi(hops as i32),
            Link::EitherPath { first, second } => {
                1.0 - (1.0 - p.powi(first as i32)) * (1.0 - p.powi(second as i32))
            }
            Link::Unreachable => 0.0,
        }
    }

    pub fn matrix(&self) -> ReliabilityMatrix {
        let rows = (0..self.node_count)
            .map(|i| (0..self.node_count).map(|j| self.reliability(i, j)).collect())
            .collect();
        ReliabilityMatrix(rows)
    }

    /// `Some(p)` when every pair is a single trial of the same probability,
    /// i.e. the model is equivalent to a homogeneous full mesh
    pub fn homogeneous_probability(&self) -> Option<f64> {
        self.matrix().uniform_value()
    }
}
