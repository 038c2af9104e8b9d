use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::types::Phase;

/// What one node has seen during the live round. Reset at every round start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRuntimeState {
    pub received_pre_prepare: bool,
    /// Counted prepares from other nodes
    pub received_prepare_count: usize,
    /// Counted commits from other nodes
    pub received_commit_count: usize,
    pub sent_prepare: bool,
    pub sent_commit: bool,
    /// Broadcast a commit for a value other than the proposal
    #[serde(default)]
    pub conflicting_commit: bool,
}

impl NodeRuntimeState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A pending timeout bound to the round that armed it
pub struct RoundTimer {
    round: u64,
    handle: JoinHandle<()>,
}

impl RoundTimer {
    pub fn new(round: u64, handle: JoinHandle<()>) -> Self {
        Self { round, handle }
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

/// The live round of a session. Replaced in place at every round start.
pub struct RoundState {
    round: u64,
    phase: Phase,
    /// Last round that was finalized; guards against double finalization
    finalized_round: Option<u64>,
    timer: Option<RoundTimer>,
}

impl Default for RoundState {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundState {
    pub fn new() -> Self {
        Self {
            round: 0,
            phase: Phase::Waiting,
            finalized_round: None,
            timer: None,
        }
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn finalized_round(&self) -> Option<u64> {
        self.finalized_round
    }

    /// Whether the live round already reached a terminal outcome
    pub fn is_finalized(&self) -> bool {
        self.finalized_round == Some(self.round)
    }

    /// A round has been started and has not been finalized yet
    pub fn is_live(&self) -> bool {
        self.round > 0 && !self.is_finalized()
    }

    /// Start the next round and return its number. Any timer of the previous round is cancelled.
    pub fn advance(&mut self) -> u64 {
        self.cancel_timer();
        self.round += 1;
        self.phase = Phase::PrePrepare;
        self.round
    }

    /// Record `round` as finalized. Only the first call for the live round succeeds.
    pub fn mark_finalized(&mut self, round: u64) -> bool {
        if round != self.round || self.is_finalized() {
            return false;
        }
        self.finalized_round = Some(round);
        self.phase = Phase::Completed;
        true
    }

    pub fn arm_timer(&mut self, timer: RoundTimer) {
        self.cancel_timer();
        self.timer = Some(timer);
    }

    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    /// Forget the timer without aborting it; used by the timer task itself when it fires
    pub fn disarm_timer(&mut self, round: u64) {
        if self.timer.as_ref().map(|t| t.round()) == Some(round) {
            self.timer = None;
        }
    }
}

impl Drop for RoundState {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
