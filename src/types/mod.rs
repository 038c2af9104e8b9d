use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod communication;
pub mod constants;
pub mod message;

pub use message::{Message, MessageError, MessageKind, MessageLog};

/// Index of a participant node, `0..node_count`
pub type NodeId = usize;

/// A unique identifier for a simulation session
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Phase of the round that is currently live in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No round has been started yet
    Waiting,
    /// The proposer is distributing its proposal
    PrePrepare,
    /// Pre-prepared replicas exchange prepare messages
    Prepare,
    /// Prepared replicas exchange commit messages
    Commit,
    /// The round reached a terminal outcome
    Completed,
}

/// Terminal status of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// At least `N - f` replicas committed
    Success,
    /// A quorum gate fell short
    Failure,
    /// The round timer fired before the round became terminal
    TimeoutFailure,
}

impl RoundStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RoundStatus::Success)
    }
}

/// The durable record of a finished round, appended to the session history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round: u64,
    pub status: RoundStatus,
    /// Human-readable reason naming the phase and the counts involved
    pub reason: String,
    /// Phase the round was in when it failed, `None` on success
    #[serde(default)]
    pub failed_phase: Option<Phase>,
    /// `|V_pp|` when the round was finalized
    pub pre_prepared: usize,
    /// `|V_p|` when the round was finalized
    pub prepared: usize,
    /// `|V_c|` when the round was finalized
    pub committed: usize,
    /// Number of logged transmission attempts tagged with this round
    pub message_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Waiting => write!(f, "waiting"),
            Phase::PrePrepare => write!(f, "pre-prepare"),
            Phase::Prepare => write!(f, "prepare"),
            Phase::Commit => write!(f, "commit"),
            Phase::Completed => write!(f, "completed"),
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Success => write!(f, "Success"),
            RoundStatus::Failure => write!(f, "Failure"),
            RoundStatus::TimeoutFailure => write!(f, "TimeoutFailure"),
        }
    }
}
