//! Sessions: one configured network of nodes playing consecutive rounds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::NodeRuntimeState;
use crate::probability::ProbabilityError;
use crate::reliability::ReliabilityError;
use crate::types::communication::{Receiver, SessionEvent};
use crate::types::{Message, MessageError, MessageKind, NodeId, Phase, RoundOutcome, SessionId};

pub mod config;
pub mod node;
pub mod registry;
pub mod state;

pub use config::{ConfigError, SessionConfig};
pub use node::SessionNode;
pub use registry::SessionRegistry;
pub use state::SessionState;

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Node {node} is out of range for {node_count} nodes")]
    InvalidNode { node: NodeId, node_count: usize },
    #[error("Node {0} is simulated and cannot be driven from outside")]
    NotInteractive(NodeId),
    #[error("Node {0} was handed over to the simulation for this round")]
    HandedOver(NodeId),
    #[error("Every interactive node is already taken")]
    NoFreeNode,
    #[error("No round is live")]
    NoLiveRound,
    #[error("A batch needs at least one round")]
    EmptyBatch,
    #[error("Invalid message: {0}")]
    Message(#[from] MessageError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid reliability: {0}")]
    Reliability(#[from] ReliabilityError),
    #[error("Probability error: {0}")]
    Probability(#[from] ProbabilityError),
}

/// Point-in-time copy of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub config: SessionConfig,
    pub phase: Phase,
    pub round: u64,
    pub finalized_round: Option<u64>,
    pub connected: Vec<NodeId>,
    /// Interactive nodes the simulation drives in the live round
    #[serde(default)]
    pub handed_over: Vec<NodeId>,
    pub nodes: Vec<NodeRuntimeState>,
    pub messages: Vec<Message>,
    pub history: Vec<RoundOutcome>,
    pub created_at: DateTime<Utc>,
}

/// Rounds that left messages in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundListing {
    pub rounds: Vec<u64>,
    pub current_round: u64,
}

/// Messages of one round, with its outcome once it is finalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundHistory {
    pub round: u64,
    pub messages: Vec<Message>,
    pub outcome: Option<RoundOutcome>,
}

#[async_trait]
pub trait ConsensusSession {
    /// Get a copy of the session's configuration, round state, log and history
    async fn snapshot(&self) -> SessionSnapshot;

    /// Start the next round. Synchronous sessions run it to completion before
    /// returning; sessions with interactive nodes return once the proposal is out.
    async fn reset_round(&self) -> Result<u64, SessionError>;

    /// Attach an external driver to an interactive node. Returns the connected roster.
    async fn connect(&self, node: NodeId) -> Result<Vec<NodeId>, SessionError>;

    /// Detach the driver of an interactive node. Returns the connected roster.
    async fn disconnect(&self, node: NodeId) -> Result<Vec<NodeId>, SessionError>;

    /// Pick the lowest interactive node nobody is connected as
    async fn assign_node(&self) -> Result<NodeId, SessionError>;

    /// Broadcast a prepare or commit on behalf of an interactive node
    async fn submit(&self, node: NodeId, kind: MessageKind, byzantine: bool) -> Result<(), SessionError>;

    /// Let the simulation play an interactive node's remaining messages of the
    /// live round, after the usual delay. The node is driven from outside again
    /// from the next round on.
    async fn hand_over(&self, node: NodeId) -> Result<(), SessionError>;

    /// Rounds present in the message log
    async fn round_listing(&self) -> RoundListing;

    /// Messages and outcome of one round
    async fn round_history(&self, round: u64) -> RoundHistory;

    /// Receive fire-and-forget notifications of everything that happens next
    async fn subscribe(&self) -> Receiver<SessionEvent>;
}
