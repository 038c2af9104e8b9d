//! Incremental evaluation of one round.
//!
//! Used when interactive nodes may inject messages at arbitrary times: every
//! delivered message is counted on arrival and quorum is re-checked after each
//! delivery. Simulated nodes react to what they have received through
//! [`Followup`]s that the session sends after its configured delay.
//!
//! Callers guarantee at most one prepare and one commit per node per round;
//! the session rejects repeats before they reach [`IncrementalRound::deliver`].

use rand::Rng;
use std::collections::BTreeSet;

use super::{Membership, NodeRuntimeState, QuorumRule, RoundMachine};
use crate::reliability::ReliabilityModel;
use crate::types::{Message, MessageKind, MessageLog, NodeId, Phase};

/// A message a simulated node has decided to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    Prepare(NodeId),
    Commit(NodeId),
}

impl Followup {
    pub fn node(&self) -> NodeId {
        match self {
            Followup::Prepare(node) | Followup::Commit(node) => *node,
        }
    }

    pub fn kind(&self, value: i64) -> MessageKind {
        match self {
            Followup::Prepare(_) => MessageKind::Prepare { value },
            Followup::Commit(_) => MessageKind::Commit { value },
        }
    }
}

/// Where the live round stands after a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Stay in the given phase
    Pending(Phase),
    /// `N - f` nodes committed
    Committed(Membership),
    /// `f + 1` distinct nodes committed a value other than the proposal
    Rejected(usize),
}

pub struct IncrementalRound<'a> {
    rule: QuorumRule,
    proposer: NodeId,
    value: i64,
    model: &'a ReliabilityModel,
    /// Nodes driven from outside; they never react on their own
    driven: &'a BTreeSet<NodeId>,
}

impl<'a> IncrementalRound<'a> {
    pub fn new(
        rule: QuorumRule,
        proposer: NodeId,
        value: i64,
        model: &'a ReliabilityModel,
        driven: &'a BTreeSet<NodeId>,
    ) -> Self {
        Self { rule, proposer, value, model, driven }
    }

    /// Distribute the proposal, identical to the synchronous pre-prepare
    pub fn pre_prepare<R: Rng + ?Sized>(
        &self,
        round: u64,
        content: Option<String>,
        nodes: &mut [NodeRuntimeState],
        log: &mut MessageLog,
        rng: &mut R,
    ) -> usize {
        RoundMachine::new(self.rule, self.proposer, self.value, self.model)
            .with_content(content)
            .pre_prepare(round, nodes, log, rng)
    }

    /// Messages simulated nodes are now entitled to send. Each is handed out once per round.
    pub fn ready_followups(&self, nodes: &mut [NodeRuntimeState]) -> Vec<Followup> {
        let mut followups = Vec::new();
        for (id, node) in nodes.iter_mut().enumerate() {
            if self.driven.contains(&id) {
                continue;
            }
            if id != self.proposer && node.received_pre_prepare && !node.sent_prepare {
                node.sent_prepare = true;
                followups.push(Followup::Prepare(id));
            }
            if self.rule.is_prepared(node) && !node.sent_commit {
                node.sent_commit = true;
                followups.push(Followup::Commit(id));
            }
        }
        followups
    }

    /// Broadcast one prepare or commit from `from` and count every delivery on arrival
    pub fn deliver<R: Rng + ?Sized>(
        &self,
        round: u64,
        from: NodeId,
        kind: MessageKind,
        byzantine: bool,
        nodes: &mut [NodeRuntimeState],
        log: &mut MessageLog,
        rng: &mut R,
    ) {
        let honest = kind.value() == self.value;
        match kind {
            MessageKind::Prepare { .. } if from == self.proposer => return,
            MessageKind::Prepare { .. } => nodes[from].sent_prepare = true,
            MessageKind::Commit { .. } => {
                nodes[from].sent_commit = true;
                nodes[from].conflicting_commit = !honest;
            }
            MessageKind::PrePrepare { .. } => return,
        }
        for target in 0..nodes.len() {
            if target == from {
                continue;
            }
            let delivered = self.model.attempt(from, target, rng);
            if let Ok(message) = Message::new(from, target, kind.clone(), round, delivered) {
                log.append(message.flagged(byzantine));
            }
            if !delivered || !honest {
                continue;
            }
            match kind {
                MessageKind::Prepare { .. } if nodes[target].received_pre_prepare => {
                    nodes[target].received_prepare_count += 1;
                }
                MessageKind::Commit { .. } if self.rule.is_prepared(&nodes[target]) => {
                    nodes[target].received_commit_count += 1;
                }
                _ => {}
            }
        }
    }

    /// Re-check quorum after a delivery
    pub fn progress(&self, nodes: &[NodeRuntimeState]) -> Progress {
        let membership = self.rule.membership(nodes);
        let needed = self.rule.success_threshold();
        let conflicting = nodes.iter().filter(|node| node.conflicting_commit).count();
        if membership.committed >= needed {
            Progress::Committed(membership)
        } else if conflicting > self.rule.fault_tolerance() {
            Progress::Rejected(conflicting)
        } else if membership.prepared >= needed {
            Progress::Pending(Phase::Commit)
        } else {
            Progress::Pending(Phase::Prepare)
        }
    }
}
