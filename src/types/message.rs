use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use super::{NodeId, Phase};

#[derive(Debug, Error, PartialEq)]
pub enum MessageError {
    #[error("Node {0} cannot address a message to itself")]
    SelfAddressed(NodeId),
    #[error("Pre-prepare can only be sent by the proposer {proposer}, not node {from}")]
    NotProposer { from: NodeId, proposer: NodeId },
    #[error("The proposer {0} does not send prepare")]
    ProposerPrepare(NodeId),
    #[error("Node {from} already sent its {phase} message this round")]
    Duplicate { from: NodeId, phase: Phase },
    #[error("Node {0} cannot commit the proposal before it is prepared")]
    NotPrepared(NodeId),
}

/// Payload of a protocol message, one variant per phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    /// The proposer's proposal, with optional free-text content
    PrePrepare { value: i64, content: Option<String> },
    Prepare { value: i64 },
    Commit { value: i64 },
}

impl MessageKind {
    /// The proposed value the message vouches for
    pub fn value(&self) -> i64 {
        match self {
            MessageKind::PrePrepare { value, .. } => *value,
            MessageKind::Prepare { value } => *value,
            MessageKind::Commit { value } => *value,
        }
    }

    /// The phase in which this kind of message is sent
    pub fn phase(&self) -> Phase {
        match self {
            MessageKind::PrePrepare { .. } => Phase::PrePrepare,
            MessageKind::Prepare { .. } => Phase::Prepare,
            MessageKind::Commit { .. } => Phase::Commit,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::PrePrepare { .. } => "pre_prepare",
            MessageKind::Prepare { .. } => "prepare",
            MessageKind::Commit { .. } => "commit",
        }
    }
}

/// One attempted transmission, as recorded in the session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: MessageKind,
    pub round: u64,
    /// Outcome of the reliability check for this attempt
    pub delivered: bool,
    /// Set on externally injected messages flagged as an attack
    pub byzantine: bool,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a point-to-point message record
    pub fn new(
        from: NodeId,
        to: NodeId,
        kind: MessageKind,
        round: u64,
        delivered: bool,
    ) -> Result<Self, MessageError> {
        if from == to {
            return Err(MessageError::SelfAddressed(from));
        }
        Ok(Self {
            from,
            to,
            kind,
            round,
            delivered,
            byzantine: false,
            timestamp: Utc::now(),
        })
    }

    pub fn flagged(mut self, byzantine: bool) -> Self {
        self.byzantine = byzantine;
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r{} {} {}->{} value={} delivered={}",
            self.round,
            self.kind.name(),
            self.from,
            self.to,
            self.kind.value(),
            self.delivered
        )
    }
}

/// Append-only log of every transmission attempt, tagged by round
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    /// Messages appended at or after position `start`
    pub fn since(&self, start: usize) -> &[Message] {
        &self.messages[start.min(self.messages.len())..]
    }

    pub fn for_round(&self, round: u64) -> impl Iterator<Item = &Message> + '_ {
        self.messages.iter().filter(move |m| m.round == round)
    }

    pub fn count_for_round(&self, round: u64) -> usize {
        self.for_round(round).count()
    }

    /// Every round that has at least one logged message, ascending
    pub fn rounds(&self) -> Vec<u64> {
        self.messages
            .iter()
            .map(|m| m.round)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
