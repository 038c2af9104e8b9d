//! The session aggregate and every mutation a round goes through.
//!
//! All methods here run with the session lock held. Nothing in this file awaits.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;

use super::{ConfigError, RoundHistory, RoundListing, SessionConfig, SessionSnapshot};
use crate::consensus::{
    Followup, IncrementalRound, NodeRuntimeState, Progress, QuorumRule, RoundMachine, RoundState, RoundVerdict,
};
use crate::reliability::ReliabilityModel;
use crate::types::communication::{EventHub, Receiver, SessionEvent};
use crate::types::{MessageError, MessageKind, MessageLog, NodeId, Phase, RoundOutcome, RoundStatus, SessionId};

/// The internal state of a session
pub struct SessionState {
    pub(crate) id: SessionId,
    pub(crate) config: SessionConfig,
    pub(crate) rule: QuorumRule,
    /// Effective model of the session; batch runs may substitute their own
    pub(crate) model: Arc<ReliabilityModel>,
    pub(crate) round: RoundState,
    pub(crate) nodes: Vec<NodeRuntimeState>,
    pub(crate) log: MessageLog,
    pub(crate) history: Vec<RoundOutcome>,
    pub(crate) connected: BTreeSet<NodeId>,
    /// Interactive nodes the simulation drives for the rest of the live round
    pub(crate) handed_over: BTreeSet<NodeId>,
    pub(crate) events: EventHub,
    /// Last finalized round number, 0 before the first
    pub(crate) finalized: watch::Sender<u64>,
    pub(crate) rng: StdRng,
    pub(crate) created_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(id: SessionId, config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let model = config.reliability_model()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (finalized, _) = watch::channel(0);
        tracing::info!(
            "Session {} created: {} nodes, f={}, {} topology, delivery rate {}%",
            id,
            config.node_count,
            config.quorum().fault_tolerance(),
            config.topology,
            config.delivery_rate
        );
        Ok(Self {
            rule: config.quorum(),
            nodes: vec![NodeRuntimeState::default(); config.node_count],
            model: Arc::new(model),
            round: RoundState::new(),
            log: MessageLog::new(),
            history: Vec::new(),
            connected: BTreeSet::new(),
            handed_over: BTreeSet::new(),
            events: EventHub::new(),
            finalized,
            rng,
            created_at: Utc::now(),
            id,
            config,
        })
    }

    pub fn subscribe_finalized(&self) -> watch::Receiver<u64> {
        self.finalized.subscribe()
    }

    pub fn subscribe_events(&mut self, buffer_size: usize) -> Receiver<SessionEvent> {
        self.events.subscribe(buffer_size)
    }

    fn set_phase(&mut self, phase: Phase) {
        self.round.set_phase(phase);
        self.events.publish(SessionEvent::PhaseUpdate { round: self.round.round(), phase });
    }

    /// Interactive nodes still waiting on their external driver
    fn driven_nodes(&self) -> BTreeSet<NodeId> {
        self.config.interactive_nodes.difference(&self.handed_over).copied().collect()
    }

    /// Push every delivered message appended since `start`
    fn publish_deliveries(&mut self, start: usize) {
        let delivered: Vec<_> = self.log.since(start).iter().filter(|m| m.delivered).cloned().collect();
        for message in delivered {
            self.events.publish(SessionEvent::MessageDelivered { message });
        }
    }

    // ------------------------------------------------------------------------------------------------
    // Round lifecycle
    // ------------------------------------------------------------------------------------------------

    /// Start the next round: close a still-live round, reset every node and
    /// bump the round number
    pub fn begin_round(&mut self) -> u64 {
        if self.round.is_live() {
            let abandoned = self.round.round();
            let phase = self.round.phase();
            self.finalize(
                abandoned,
                RoundStatus::Failure,
                format!("abandoned: round {} started before round {} was terminal", abandoned + 1, abandoned),
                Some(phase),
            );
        }
        for node in self.nodes.iter_mut() {
            node.reset();
        }
        self.handed_over.clear();
        let round = self.round.advance();
        tracing::debug!("Session {} starting round {}", self.id, round);
        self.events.publish(SessionEvent::NewRound { round });
        self.events.publish(SessionEvent::PhaseUpdate { round, phase: Phase::PrePrepare });
        round
    }

    /// Record the terminal outcome of `round`. Only the first call for the live
    /// round has any effect; later or stale calls return `None`.
    pub fn finalize(
        &mut self,
        round: u64,
        status: RoundStatus,
        reason: String,
        failed_phase: Option<Phase>,
    ) -> Option<RoundOutcome> {
        if !self.round.mark_finalized(round) {
            tracing::debug!("Session {} ignoring finalize of round {} ({})", self.id, round, status);
            return None;
        }
        self.round.cancel_timer();
        let membership = self.rule.membership(&self.nodes);
        let outcome = RoundOutcome {
            round,
            status,
            reason,
            failed_phase,
            pre_prepared: membership.pre_prepared,
            prepared: membership.prepared,
            committed: membership.committed,
            message_count: self.log.count_for_round(round),
            timestamp: Utc::now(),
        };
        tracing::info!("Session {} round {} finalized: {} ({})", self.id, round, outcome.status, outcome.reason);
        self.history.push(outcome.clone());
        self.finalized.send_replace(round);
        self.events.publish(SessionEvent::PhaseUpdate { round, phase: Phase::Completed });
        self.events.publish(SessionEvent::RoundCompleted { outcome: outcome.clone() });
        Some(outcome)
    }

    /// Run the live round to completion with every send of a phase resolved
    /// before its quorum check
    pub fn run_synchronous(&mut self, round: u64, model: &ReliabilityModel) -> Option<RoundOutcome> {
        let machine = RoundMachine::new(self.rule, self.config.proposer, self.config.proposal_value, model)
            .with_content(self.config.proposal_content.clone());
        let verdict = self.play_phases(&machine, round);
        self.finalize(round, verdict.status, verdict.reason, verdict.failed_phase)
    }

    /// Each phase publishes its phase update, then its deliveries, then runs its gate
    fn play_phases(&mut self, machine: &RoundMachine<'_>, round: u64) -> RoundVerdict {
        let start = self.log.len();
        machine.pre_prepare(round, &mut self.nodes, &mut self.log, &mut self.rng);
        self.publish_deliveries(start);
        if let Some(verdict) = machine.pre_prepare_gate(&self.nodes) {
            return verdict;
        }

        self.set_phase(Phase::Prepare);
        let start = self.log.len();
        machine.prepare(round, &mut self.nodes, &mut self.log, &mut self.rng);
        self.publish_deliveries(start);
        if let Some(verdict) = machine.prepare_gate(&self.nodes) {
            return verdict;
        }

        self.set_phase(Phase::Commit);
        let start = self.log.len();
        machine.commit(round, &mut self.nodes, &mut self.log, &mut self.rng);
        self.publish_deliveries(start);
        machine.commit_verdict(&self.nodes)
    }

    // ------------------------------------------------------------------------------------------------
    // Incremental rounds
    // ------------------------------------------------------------------------------------------------

    /// Distribute the proposal of an interactive round and return the first
    /// messages simulated nodes want to send. Empty when the round already failed.
    pub fn start_incremental(&mut self, round: u64) -> Vec<Followup> {
        let start = self.log.len();
        let model = Arc::clone(&self.model);
        let driven = self.driven_nodes();
        let incremental =
            IncrementalRound::new(self.rule, self.config.proposer, self.config.proposal_value, &model, &driven);
        incremental.pre_prepare(
            round,
            self.config.proposal_content.clone(),
            &mut self.nodes,
            &mut self.log,
            &mut self.rng,
        );
        let followups = incremental.ready_followups(&mut self.nodes);
        self.publish_deliveries(start);

        let gate = RoundMachine::new(self.rule, self.config.proposer, self.config.proposal_value, &model)
            .pre_prepare_gate(&self.nodes);
        if let Some(verdict) = gate {
            self.finalize(round, verdict.status, verdict.reason, verdict.failed_phase);
            return Vec::new();
        }
        self.set_phase(Phase::Prepare);
        followups
    }

    /// Deliver one prepare or commit broadcast from `from` into `round`.
    /// Returns the messages simulated nodes became entitled to send as a result;
    /// a stale or finalized round accepts nothing.
    pub fn apply(&mut self, round: u64, from: NodeId, kind: MessageKind, byzantine: bool) -> Vec<Followup> {
        if round != self.round.round() || self.round.is_finalized() {
            tracing::debug!("Session {} dropping {} from node {} for stale round {}", self.id, kind.name(), from, round);
            return Vec::new();
        }
        let start = self.log.len();
        let model = Arc::clone(&self.model);
        let driven = self.driven_nodes();
        let incremental =
            IncrementalRound::new(self.rule, self.config.proposer, self.config.proposal_value, &model, &driven);
        incremental.deliver(round, from, kind, byzantine, &mut self.nodes, &mut self.log, &mut self.rng);
        let progress = incremental.progress(&self.nodes);
        let followups = incremental.ready_followups(&mut self.nodes);
        self.publish_deliveries(start);

        match progress {
            Progress::Committed(membership) => {
                let reason = format!(
                    "{} of {} nodes committed value {}",
                    membership.committed, self.config.node_count, self.config.proposal_value
                );
                self.finalize(round, RoundStatus::Success, reason, None);
                Vec::new()
            }
            Progress::Rejected(conflicting) => {
                let reason = format!(
                    "commit: {} nodes committed a conflicting value, {} reject the round",
                    conflicting,
                    self.rule.fault_tolerance() + 1
                );
                self.finalize(round, RoundStatus::Failure, reason, Some(Phase::Commit));
                Vec::new()
            }
            Progress::Pending(Phase::Commit) if self.round.phase() == Phase::Prepare => {
                self.set_phase(Phase::Commit);
                followups
            }
            Progress::Pending(_) => followups,
        }
    }

    /// Reject a broadcast `node` is not entitled to make in the live round
    pub fn check_submission(&self, node: NodeId, kind: &MessageKind) -> Result<(), MessageError> {
        let state = &self.nodes[node];
        match kind {
            MessageKind::PrePrepare { .. } if node != self.config.proposer => {
                Err(MessageError::NotProposer { from: node, proposer: self.config.proposer })
            }
            MessageKind::Prepare { .. } if node == self.config.proposer => Err(MessageError::ProposerPrepare(node)),
            MessageKind::Prepare { .. } if state.sent_prepare => {
                Err(MessageError::Duplicate { from: node, phase: Phase::Prepare })
            }
            MessageKind::Commit { .. } if state.sent_commit => {
                Err(MessageError::Duplicate { from: node, phase: Phase::Commit })
            }
            // a conflicting commit needs no quorum behind it
            MessageKind::Commit { value } if *value == self.config.proposal_value && !self.rule.is_prepared(state) => {
                Err(MessageError::NotPrepared(node))
            }
            _ => Ok(()),
        }
    }

    /// Let the simulation drive `node` until the next round starts. Returns the
    /// messages it is entitled to send right away.
    pub fn hand_over(&mut self, node: NodeId) -> Vec<Followup> {
        if !self.handed_over.insert(node) {
            return Vec::new();
        }
        tracing::info!("Session {} node {} handed over for round {}", self.id, node, self.round.round());
        let model = Arc::clone(&self.model);
        let driven = self.driven_nodes();
        IncrementalRound::new(self.rule, self.config.proposer, self.config.proposal_value, &model, &driven)
            .ready_followups(&mut self.nodes)
    }

    pub fn is_handed_over(&self, node: NodeId) -> bool {
        self.handed_over.contains(&node)
    }

    // ------------------------------------------------------------------------------------------------
    // Interactive nodes
    // ------------------------------------------------------------------------------------------------

    pub fn connect(&mut self, node: NodeId) -> Vec<NodeId> {
        self.connected.insert(node);
        self.publish_roster()
    }

    pub fn disconnect(&mut self, node: NodeId) -> Vec<NodeId> {
        self.connected.remove(&node);
        self.publish_roster()
    }

    fn publish_roster(&mut self) -> Vec<NodeId> {
        let nodes: Vec<NodeId> = self.connected.iter().copied().collect();
        self.events.publish(SessionEvent::ConnectedNodes { nodes: nodes.clone() });
        nodes
    }

    /// Lowest interactive node nobody is connected as
    pub fn free_interactive_node(&self) -> Option<NodeId> {
        self.config.interactive_nodes.iter().copied().find(|node| !self.connected.contains(node))
    }

    // ------------------------------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            config: self.config.clone(),
            phase: self.round.phase(),
            round: self.round.round(),
            finalized_round: self.round.finalized_round(),
            connected: self.connected.iter().copied().collect(),
            handed_over: self.handed_over.iter().copied().collect(),
            nodes: self.nodes.clone(),
            messages: self.log.all().to_vec(),
            history: self.history.clone(),
            created_at: self.created_at,
        }
    }

    pub fn round_listing(&self) -> RoundListing {
        RoundListing { rounds: self.log.rounds(), current_round: self.round.round() }
    }

    pub fn round_history(&self, round: u64) -> RoundHistory {
        RoundHistory {
            round,
            messages: self.log.for_round(round).cloned().collect(),
            outcome: self.history.iter().find(|o| o.round == round).cloned(),
        }
    }
}
