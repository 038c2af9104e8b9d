//! Synchronous evaluation of one round.
//!
//! Every send of a phase is resolved before that phase's quorum is evaluated, so
//! no ordering artifact can influence the outcome. This is the mode the
//! probability engine models and the only one the orchestrator uses.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Membership, NodeRuntimeState, QuorumRule};
use crate::reliability::ReliabilityModel;
use crate::types::{Message, MessageKind, MessageLog, NodeId, Phase, RoundStatus};

/// Outcome of a round as judged by the state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundVerdict {
    pub status: RoundStatus,
    pub reason: String,
    /// Phase whose gate fell short, `None` on success
    pub failed_phase: Option<Phase>,
    pub membership: Membership,
}

/// Runs the three phases of a round against a reliability model
pub struct RoundMachine<'a> {
    rule: QuorumRule,
    proposer: NodeId,
    value: i64,
    content: Option<String>,
    model: &'a ReliabilityModel,
}

impl<'a> RoundMachine<'a> {
    pub fn new(rule: QuorumRule, proposer: NodeId, value: i64, model: &'a ReliabilityModel) -> Self {
        Self { rule, proposer, value, content: None, model }
    }

    pub fn with_content(mut self, content: Option<String>) -> Self {
        self.content = content;
        self
    }

    fn send<R: Rng + ?Sized>(
        &self,
        from: NodeId,
        to: NodeId,
        kind: MessageKind,
        round: u64,
        log: &mut MessageLog,
        rng: &mut R,
    ) -> bool {
        let delivered = self.model.attempt(from, to, rng);
        // from != to is guaranteed by every caller
        if let Ok(message) = Message::new(from, to, kind, round, delivered) {
            log.append(message);
        }
        delivered
    }

    /// Proposer distributes its proposal. Returns `|V_pp|`.
    pub fn pre_prepare<R: Rng + ?Sized>(
        &self,
        round: u64,
        nodes: &mut [NodeRuntimeState],
        log: &mut MessageLog,
        rng: &mut R,
    ) -> usize {
        nodes[self.proposer].received_pre_prepare = true;
        let kind = MessageKind::PrePrepare { value: self.value, content: self.content.clone() };
        for target in 0..nodes.len() {
            if target == self.proposer {
                continue;
            }
            if self.send(self.proposer, target, kind.clone(), round, log, rng) {
                nodes[target].received_pre_prepare = true;
            }
        }
        nodes.iter().filter(|n| n.received_pre_prepare).count()
    }

    /// Every pre-prepared node except the proposer broadcasts `prepare`. Returns `|V_p|`.
    pub fn prepare<R: Rng + ?Sized>(
        &self,
        round: u64,
        nodes: &mut [NodeRuntimeState],
        log: &mut MessageLog,
        rng: &mut R,
    ) -> usize {
        let senders: Vec<NodeId> = (0..nodes.len())
            .filter(|&i| i != self.proposer && nodes[i].received_pre_prepare)
            .collect();
        let kind = MessageKind::Prepare { value: self.value };
        for &sender in &senders {
            nodes[sender].sent_prepare = true;
            for target in 0..nodes.len() {
                if target == sender {
                    continue;
                }
                let delivered = self.send(sender, target, kind.clone(), round, log, rng);
                // only a replica holding the pre-prepare processes a prepare
                if delivered && nodes[target].received_pre_prepare {
                    nodes[target].received_prepare_count += 1;
                }
            }
        }
        nodes.iter().filter(|n| self.rule.is_prepared(n)).count()
    }

    /// Every prepared node broadcasts `commit`. Returns `|V_c|`.
    pub fn commit<R: Rng + ?Sized>(
        &self,
        round: u64,
        nodes: &mut [NodeRuntimeState],
        log: &mut MessageLog,
        rng: &mut R,
    ) -> usize {
        // V_p is fixed before the first commit goes out
        let prepared: Vec<bool> = nodes.iter().map(|n| self.rule.is_prepared(n)).collect();
        let kind = MessageKind::Commit { value: self.value };
        for sender in 0..nodes.len() {
            if !prepared[sender] {
                continue;
            }
            nodes[sender].sent_commit = true;
            for target in 0..nodes.len() {
                if target == sender {
                    continue;
                }
                let delivered = self.send(sender, target, kind.clone(), round, log, rng);
                if delivered && prepared[target] {
                    nodes[target].received_commit_count += 1;
                }
            }
        }
        nodes.iter().filter(|n| self.rule.is_committed(n)).count()
    }

    /// Judge the pre-prepare gate: `Some(verdict)` if the round already failed
    pub fn pre_prepare_gate(&self, nodes: &[NodeRuntimeState]) -> Option<RoundVerdict> {
        let membership = self.rule.membership(nodes);
        let needed = self.rule.success_threshold();
        if membership.pre_prepared < needed {
            return Some(RoundVerdict {
                status: RoundStatus::Failure,
                reason: format!(
                    "pre-prepare: {} of {} nodes hold the proposal, {} needed",
                    membership.pre_prepared,
                    self.rule.node_count(),
                    needed
                ),
                failed_phase: Some(Phase::PrePrepare),
                membership,
            });
        }
        None
    }

    /// Judge the prepare gate once every prepare has been resolved
    pub fn prepare_gate(&self, nodes: &[NodeRuntimeState]) -> Option<RoundVerdict> {
        let membership = self.rule.membership(nodes);
        let needed = self.rule.success_threshold();
        if membership.prepared < needed {
            return Some(RoundVerdict {
                status: RoundStatus::Failure,
                reason: format!(
                    "prepare: {} nodes reached {} prepares, {} needed",
                    membership.prepared,
                    self.rule.prepare_threshold(),
                    needed
                ),
                failed_phase: Some(Phase::Prepare),
                membership,
            });
        }
        None
    }

    /// Final verdict once every commit has been resolved
    pub fn commit_verdict(&self, nodes: &[NodeRuntimeState]) -> RoundVerdict {
        let membership = self.rule.membership(nodes);
        let needed = self.rule.success_threshold();
        if membership.committed < needed {
            return RoundVerdict {
                status: RoundStatus::Failure,
                reason: format!(
                    "commit: {} nodes reached {} commits, {} needed",
                    membership.committed,
                    self.rule.commit_threshold(),
                    needed
                ),
                failed_phase: Some(Phase::Commit),
                membership,
            };
        }
        RoundVerdict {
            status: RoundStatus::Success,
            reason: format!("{} of {} nodes committed value {}", membership.committed, self.rule.node_count(), self.value),
            failed_phase: None,
            membership,
        }
    }

    /// Run a whole round on freshly reset node states
    pub fn run<R: Rng + ?Sized>(
        &self,
        round: u64,
        nodes: &mut [NodeRuntimeState],
        log: &mut MessageLog,
        rng: &mut R,
    ) -> RoundVerdict {
        self.pre_prepare(round, nodes, log, rng);
        if let Some(verdict) = self.pre_prepare_gate(nodes) {
            return verdict;
        }
        self.prepare(round, nodes, log, rng);
        if let Some(verdict) = self.prepare_gate(nodes) {
            return verdict;
        }
        self.commit(round, nodes, log, rng);
        self.commit_verdict(nodes)
    }
}
