//! Immutable per-session configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

use crate::consensus::QuorumRule;
use crate::reliability::{ReliabilityError, ReliabilityMatrix, ReliabilityModel, SenderOverrides, Topology};
use crate::types::{constants, NodeId};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
    #[error("Invalid reliability: {0}")]
    Reliability(#[from] ReliabilityError),
}

fn default_delivery_rate() -> f64 {
    100.0
}

fn default_round_timeout_secs() -> f64 {
    constants::DEFAULT_ROUND_TIMEOUT.as_secs_f64()
}

fn default_robot_delay_secs() -> f64 {
    constants::DEFAULT_ROBOT_DELAY.as_secs_f64()
}

/// Everything that stays fixed for the lifetime of a session.
///
/// `f = floor((N - 1) / 3)` is derived through [`SessionConfig::quorum`] and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub node_count: usize,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub proposer: NodeId,
    #[serde(default)]
    pub proposal_value: i64,
    /// Free-text description carried by the pre-prepare
    #[serde(default)]
    pub proposal_content: Option<String>,
    /// Percentage 0-100, mapped to the per-hop link probability
    #[serde(default = "default_delivery_rate")]
    pub delivery_rate: f64,
    /// Replaces the topology and `delivery_rate` when present
    #[serde(default)]
    pub custom_matrix: Option<ReliabilityMatrix>,
    /// sender -> (target -> probability), wins over everything for its pair
    #[serde(default)]
    pub sender_overrides: SenderOverrides,
    /// Nodes driven from outside the core; every other node is simulated
    #[serde(default)]
    pub interactive_nodes: BTreeSet<NodeId>,
    #[serde(default = "default_round_timeout_secs")]
    pub round_timeout_secs: f64,
    /// How long a simulated node waits before answering in an interactive round
    #[serde(default = "default_robot_delay_secs")]
    pub robot_delay_secs: f64,
    /// Seed for reproducible experiments, fresh entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SessionConfig {
    /// A full-mesh, fully reliable session of `node_count` nodes
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            topology: Topology::Full,
            proposer: constants::DEFAULT_PROPOSER,
            proposal_value: 0,
            proposal_content: None,
            delivery_rate: default_delivery_rate(),
            custom_matrix: None,
            sender_overrides: SenderOverrides::new(),
            interactive_nodes: BTreeSet::new(),
            round_timeout_secs: default_round_timeout_secs(),
            robot_delay_secs: default_robot_delay_secs(),
            seed: None,
        }
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_delivery_rate(mut self, delivery_rate: f64) -> Self {
        self.delivery_rate = delivery_rate;
        self
    }

    pub fn with_proposal(mut self, value: i64, content: Option<String>) -> Self {
        self.proposal_value = value;
        self.proposal_content = content;
        self
    }

    pub fn with_custom_matrix(mut self, matrix: ReliabilityMatrix) -> Self {
        self.custom_matrix = Some(matrix);
        self
    }

    pub fn with_interactive_nodes(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.interactive_nodes = nodes.into_iter().collect();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_timings(mut self, round_timeout: Duration, robot_delay: Duration) -> Self {
        self.round_timeout_secs = round_timeout.as_secs_f64();
        self.robot_delay_secs = robot_delay.as_secs_f64();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count == 0 {
            return Err(ConfigError::ValidationError("Node count must be positive".into()));
        }
        if self.proposer >= self.node_count {
            return Err(ConfigError::ValidationError(format!(
                "Proposer {} is out of range for {} nodes",
                self.proposer, self.node_count
            )));
        }
        if !self.delivery_rate.is_finite() || !(0.0..=100.0).contains(&self.delivery_rate) {
            return Err(ConfigError::ValidationError(format!(
                "Delivery rate must be between 0 and 100, got {}",
                self.delivery_rate
            )));
        }
        if let Some(&node) = self.interactive_nodes.iter().find(|&&n| n >= self.node_count) {
            return Err(ConfigError::ValidationError(format!(
                "Interactive node {} is out of range for {} nodes",
                node, self.node_count
            )));
        }
        if !self.round_timeout_secs.is_finite() || self.round_timeout_secs <= 0.0 {
            return Err(ConfigError::ValidationError("Round timeout must be positive".into()));
        }
        if !self.robot_delay_secs.is_finite() || self.robot_delay_secs < 0.0 {
            return Err(ConfigError::ValidationError("Robot delay must be non-negative".into()));
        }
        if let Some(matrix) = &self.custom_matrix {
            matrix.ensure_dimension(self.node_count)?;
        }
        // building the model checks the topology and every override
        self.reliability_model()?;
        Ok(())
    }

    /// Per-hop success probability `p = delivery_rate / 100`
    pub fn link_probability(&self) -> f64 {
        self.delivery_rate / 100.0
    }

    pub fn quorum(&self) -> QuorumRule {
        QuorumRule::new(self.node_count)
    }

    /// The session's effective reliability model
    pub fn reliability_model(&self) -> Result<ReliabilityModel, ConfigError> {
        self.reliability_model_with(self.custom_matrix.as_ref())
    }

    /// The effective model with `matrix` in place of the configured custom matrix.
    /// Sender overrides are applied last either way.
    pub fn reliability_model_with(&self, matrix: Option<&ReliabilityMatrix>) -> Result<ReliabilityModel, ConfigError> {
        let mut model = ReliabilityModel::new(self.node_count, self.topology, self.link_probability())?;
        if let Some(matrix) = matrix {
            model = model.with_custom_matrix(matrix)?;
        }
        Ok(model.with_overrides(&self.sender_overrides)?)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.round_timeout_secs)
    }

    pub fn robot_delay(&self) -> Duration {
        Duration::from_secs_f64(self.robot_delay_secs)
    }

    pub fn is_interactive(&self, node: NodeId) -> bool {
        self.interactive_nodes.contains(&node)
    }
}
