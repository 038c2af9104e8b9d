use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, Duration};

use super::{
    ConfigError, ConsensusSession, RoundHistory, RoundListing, SessionConfig, SessionError, SessionSnapshot,
    SessionState,
};
use crate::consensus::{Followup, RoundTimer};
use crate::reliability::ReliabilityModel;
use crate::types::communication::{Receiver, SessionEvent};
use crate::types::{constants, MessageKind, NodeId, RoundOutcome, RoundStatus, SessionId};

/// Handle to one session. Clones share the same state.
#[derive(Clone)]
pub struct SessionNode {
    id: SessionId,
    state: Arc<Mutex<SessionState>>,
    finalized: watch::Receiver<u64>,
}

impl SessionNode {
    pub fn new(id: SessionId, config: SessionConfig) -> Result<Self, ConfigError> {
        let state = SessionState::new(id.clone(), config)?;
        let finalized = state.subscribe_finalized();
        Ok(Self { id, state: Arc::new(Mutex::new(state)), finalized })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub async fn config(&self) -> SessionConfig {
        self.state.lock().await.config.clone()
    }

    /// The session's effective reliability model
    pub async fn model(&self) -> Arc<ReliabilityModel> {
        Arc::clone(&self.state.lock().await.model)
    }

    /// Watch the number of the last finalized round
    pub fn finalized_receiver(&self) -> watch::Receiver<u64> {
        self.finalized.clone()
    }

    /// Outcome of a finalized round
    pub async fn outcome(&self, round: u64) -> Option<RoundOutcome> {
        self.state.lock().await.history.iter().find(|o| o.round == round).cloned()
    }

    /// Start a round and run it synchronously, with `model` in place of the
    /// session's own when given. Returns the round number and its outcome.
    pub async fn play_round(&self, model: Option<Arc<ReliabilityModel>>) -> (u64, Option<RoundOutcome>) {
        let mut state = self.state.lock().await;
        let model = model.unwrap_or_else(|| Arc::clone(&state.model));
        let round = state.begin_round();
        let outcome = state.run_synchronous(round, &model);
        (round, outcome)
    }

    /// Start a round whose prepares and commits trickle in over time
    pub async fn start_interactive_round(&self) -> u64 {
        let mut state = self.state.lock().await;
        let round = state.begin_round();
        let followups = state.start_incremental(round);
        if !state.round.is_finalized() {
            self.arm_timer(&mut state, round);
        }
        let delay = state.config.robot_delay();
        let value = state.config.proposal_value;
        drop(state);
        dispatch_followups(Arc::downgrade(&self.state), round, value, followups, delay);
        round
    }

    /// Finalize the round as a timeout failure if it is still live once the
    /// session's round timeout has elapsed
    fn arm_timer(&self, state: &mut SessionState, round: u64) {
        let weak = Arc::downgrade(&self.state);
        let timeout = state.config.round_timeout();
        let handle = tokio::spawn(async move {
            sleep(timeout).await;
            let Some(shared) = weak.upgrade() else { return };
            let mut state = shared.lock().await;
            state.round.disarm_timer(round);
            let reason = format!("timeout: round {} was not terminal after {:?}", round, timeout);
            let phase = state.round.phase();
            state.finalize(round, RoundStatus::TimeoutFailure, reason, Some(phase));
        });
        state.round.arm_timer(RoundTimer::new(round, handle));
    }

    fn check_node(state: &SessionState, node: NodeId) -> Result<(), SessionError> {
        if node >= state.config.node_count {
            return Err(SessionError::InvalidNode { node, node_count: state.config.node_count });
        }
        if !state.config.is_interactive(node) {
            return Err(SessionError::NotInteractive(node));
        }
        Ok(())
    }

    /// Cancel the live round's timer; pending delayed sends become no-ops once
    /// the last handle is gone
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.round.cancel_timer();
        tracing::debug!("Session {} shut down", self.id);
    }
}

/// Send `followups` on behalf of simulated nodes after `delay`, then keep
/// answering whatever those sends unlocked. Bound to `round`: once another
/// round has started the sends are dropped.
fn dispatch_followups(
    session: Weak<Mutex<SessionState>>,
    round: u64,
    value: i64,
    followups: Vec<Followup>,
    delay: Duration,
) {
    if followups.is_empty() {
        return;
    }
    tokio::spawn(async move {
        sleep(delay).await;
        let Some(shared) = session.upgrade() else { return };
        let mut next = Vec::new();
        {
            let mut state = shared.lock().await;
            for followup in followups {
                next.extend(state.apply(round, followup.node(), followup.kind(value), false));
            }
        }
        dispatch_followups(Arc::downgrade(&shared), round, value, next, delay);
    });
}

#[async_trait]
impl ConsensusSession for SessionNode {
    async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    async fn reset_round(&self) -> Result<u64, SessionError> {
        let interactive = !self.state.lock().await.config.interactive_nodes.is_empty();
        if interactive {
            Ok(self.start_interactive_round().await)
        } else {
            Ok(self.play_round(None).await.0)
        }
    }

    async fn connect(&self, node: NodeId) -> Result<Vec<NodeId>, SessionError> {
        let mut state = self.state.lock().await;
        Self::check_node(&state, node)?;
        tracing::info!("Session {} node {} connected", self.id, node);
        Ok(state.connect(node))
    }

    async fn disconnect(&self, node: NodeId) -> Result<Vec<NodeId>, SessionError> {
        let mut state = self.state.lock().await;
        Self::check_node(&state, node)?;
        tracing::info!("Session {} node {} disconnected", self.id, node);
        Ok(state.disconnect(node))
    }

    async fn assign_node(&self) -> Result<NodeId, SessionError> {
        self.state.lock().await.free_interactive_node().ok_or(SessionError::NoFreeNode)
    }

    async fn submit(&self, node: NodeId, kind: MessageKind, byzantine: bool) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        Self::check_node(&state, node)?;
        if !state.round.is_live() {
            return Err(SessionError::NoLiveRound);
        }
        if state.is_handed_over(node) {
            return Err(SessionError::HandedOver(node));
        }
        state.check_submission(node, &kind)?;
        if let MessageKind::PrePrepare { .. } = kind {
            // the proposal already went out when the round started
            tracing::debug!("Session {} ignoring repeated pre-prepare from proposer {}", self.id, node);
            return Ok(());
        }
        let round = state.round.round();
        let followups = state.apply(round, node, kind, byzantine);
        let delay = state.config.robot_delay();
        let value = state.config.proposal_value;
        drop(state);
        dispatch_followups(Arc::downgrade(&self.state), round, value, followups, delay);
        Ok(())
    }

    async fn hand_over(&self, node: NodeId) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        Self::check_node(&state, node)?;
        if !state.round.is_live() {
            return Err(SessionError::NoLiveRound);
        }
        let round = state.round.round();
        let followups = state.hand_over(node);
        let delay = state.config.robot_delay();
        let value = state.config.proposal_value;
        drop(state);
        dispatch_followups(Arc::downgrade(&self.state), round, value, followups, delay);
        Ok(())
    }

    async fn round_listing(&self) -> RoundListing {
        self.state.lock().await.round_listing()
    }

    async fn round_history(&self, round: u64) -> RoundHistory {
        self.state.lock().await.round_history(round)
    }

    async fn subscribe(&self) -> Receiver<SessionEvent> {
        self.state.lock().await.subscribe_events(constants::EVENT_BUFFER_SIZE)
    }
}
