//! Theoretical probability that a round succeeds.
//!
//! Two engines share the thresholds of [`QuorumRule`] with the simulator:
//! a closed form for the homogeneous full mesh and an exact enumeration over
//! phase sets for arbitrary reliability matrices. On a full mesh they agree.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::QuorumRule;
use crate::reliability::{ReliabilityMatrix, ReliabilityModel};
use crate::types::{constants, NodeId};

pub mod closed_form;
pub mod distributions;
pub mod exact;


#[derive(Debug, Error, PartialEq)]
pub enum ProbabilityError {
    #[error("Exact enumeration supports at most {max} nodes, the session has {node_count}")]
    TooManyNodes { node_count: usize, max: usize },
    #[error("Reliability matrix is {found}x{found}, the session has {expected} nodes")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Proposer {proposer} is out of range for {node_count} nodes")]
    InvalidProposer { proposer: NodeId, node_count: usize },
}

/// Which engine produced a theoretical rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    ClosedForm,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Theoretical {
    pub probability: f64,
    pub method: Method,
}

/// Computes `P(round succeeds)` without running any simulation
#[derive(Debug, Clone, Copy)]
pub struct ProbabilityEngine {
    rule: QuorumRule,
    proposer: NodeId,
}

impl ProbabilityEngine {
    pub fn new(rule: QuorumRule, proposer: NodeId) -> Result<Self, ProbabilityError> {
        if proposer >= rule.node_count() {
            return Err(ProbabilityError::InvalidProposer { proposer, node_count: rule.node_count() });
        }
        Ok(Self { rule, proposer })
    }

    /// Closed form for a full mesh where every transmission succeeds with `p`
    pub fn closed_form(&self, p: f64) -> f64 {
        closed_form::success_probability(self.rule, p)
    }

    /// Exact enumeration for an arbitrary reliability matrix
    pub fn exact(&self, matrix: &ReliabilityMatrix) -> Result<f64, ProbabilityError> {
        if matrix.dimension() != self.rule.node_count() {
            return Err(ProbabilityError::DimensionMismatch {
                expected: self.rule.node_count(),
                found: matrix.dimension(),
            });
        }
        if self.rule.node_count() > constants::EXACT_MAX_NODES {
            return Err(ProbabilityError::TooManyNodes {
                node_count: self.rule.node_count(),
                max: constants::EXACT_MAX_NODES,
            });
        }
        Ok(exact::success_probability(self.rule, self.proposer, matrix))
    }

    /// Pick the engine that applies to `model`: the closed form when it is a
    /// homogeneous full mesh, exact enumeration otherwise
    pub fn theoretical(&self, model: &ReliabilityModel) -> Result<Theoretical, ProbabilityError> {
        if let Some(p) = model.homogeneous_probability() {
            return Ok(Theoretical { probability: self.closed_form(p), method: Method::ClosedForm });
        }
        let probability = self.exact(&model.matrix())?;
        Ok(Theoretical { probability, method: Method::Exact })
    }
}
