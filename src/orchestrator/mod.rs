//! Batch experiments: many synchronous rounds on one session, compared with theory.
//!
//! Rounds never overlap. Round `k + 1` is only started after round `k`'s
//! finalize marker has been observed or the bounded wait for it has elapsed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{timeout, Duration, Instant};

use crate::consensus::Membership;
use crate::probability::{ProbabilityEngine, ProbabilityError, Theoretical};
use crate::reliability::ReliabilityMatrix;
use crate::session::{SessionError, SessionNode};
use crate::types::{constants, Phase, RoundOutcome, RoundStatus, SessionId};


/// Parameters of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub rounds: usize,
    /// Replaces the session's topology for this batch only
    #[serde(default)]
    pub custom_matrix: Option<ReliabilityMatrix>,
}

impl BatchRequest {
    pub fn new(rounds: usize) -> Self {
        Self { rounds, custom_matrix: None }
    }

    pub fn with_custom_matrix(mut self, matrix: ReliabilityMatrix) -> Self {
        self.custom_matrix = Some(matrix);
        self
    }
}

/// What the orchestrator observed for one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub round: u64,
    pub status: RoundStatus,
    pub reason: String,
    /// Phase the round failed in, `None` on success or when no outcome arrived
    #[serde(default)]
    pub failed_phase: Option<Phase>,
    pub membership: Membership,
    pub message_count: usize,
    /// Time spent waiting for the finalize marker, in milliseconds
    pub wait_ms: u64,
}

impl RoundResult {
    pub fn success(&self) -> bool {
        self.status.is_success()
    }

    fn from_outcome(outcome: RoundOutcome, wait: Duration) -> Self {
        Self {
            round: outcome.round,
            status: outcome.status,
            reason: outcome.reason,
            failed_phase: outcome.failed_phase,
            membership: Membership {
                pre_prepared: outcome.pre_prepared,
                prepared: outcome.prepared,
                committed: outcome.committed,
            },
            message_count: outcome.message_count,
            wait_ms: wait.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub session_id: SessionId,
    pub total_rounds: usize,
    pub successes: usize,
    pub failures: usize,
    pub empirical_rate: f64,
    /// Absent when neither engine applies to the effective model
    pub theoretical: Option<Theoretical>,
    pub rounds: Vec<RoundResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// `empirical - theoretical`, when a theoretical rate exists
    pub fn deviation(&self) -> Option<f64> {
        self.theoretical.map(|t| self.empirical_rate - t.probability)
    }
}

/// Drives sequential batches of synchronous rounds
#[derive(Debug, Clone)]
pub struct ExperimentOrchestrator {
    finalize_wait: Duration,
}

impl Default for ExperimentOrchestrator {
    fn default() -> Self {
        Self::new(constants::DEFAULT_FINALIZE_WAIT)
    }
}

impl ExperimentOrchestrator {
    pub fn new(finalize_wait: Duration) -> Self {
        Self { finalize_wait }
    }

    pub fn finalize_wait(&self) -> Duration {
        self.finalize_wait
    }

    pub async fn run(&self, session: &SessionNode, request: BatchRequest) -> Result<BatchReport, SessionError> {
        self.run_with_progress(session, request, |_| {}).await
    }

    /// Run the batch, calling `on_round` after each round is recorded
    pub async fn run_with_progress<F>(
        &self,
        session: &SessionNode,
        request: BatchRequest,
        mut on_round: F,
    ) -> Result<BatchReport, SessionError>
    where
        F: FnMut(&RoundResult) + Send,
    {
        if request.rounds == 0 {
            return Err(SessionError::EmptyBatch);
        }
        let config = session.config().await;
        // the batch matrix is validated before the first round runs
        let model = match &request.custom_matrix {
            Some(matrix) => {
                matrix.ensure_dimension(config.node_count)?;
                Arc::new(config.reliability_model_with(Some(matrix))?)
            }
            None => session.model().await,
        };

        let engine = ProbabilityEngine::new(config.quorum(), config.proposer)?;
        let theoretical = match engine.theoretical(&model) {
            Ok(theoretical) => Some(theoretical),
            Err(ProbabilityError::TooManyNodes { node_count, max }) => {
                tracing::warn!(
                    "No theoretical rate for session {}: {} nodes exceed the exact enumeration limit of {}",
                    session.id(),
                    node_count,
                    max
                );
                None
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            "Session {} batch of {} rounds starting, theoretical rate {:?}",
            session.id(),
            request.rounds,
            theoretical.map(|t| t.probability)
        );

        let started_at = Utc::now();
        let mut finalized = session.finalized_receiver();
        let mut rounds = Vec::with_capacity(request.rounds);
        for _ in 0..request.rounds {
            let (round, outcome) = session.play_round(Some(Arc::clone(&model))).await;

            let waited_from = Instant::now();
            let observed = timeout(self.finalize_wait, finalized.wait_for(|last| *last >= round))
                .await
                .map(|marker| marker.is_ok());
            let wait = waited_from.elapsed();

            let result = match (observed, outcome) {
                (Ok(true), Some(outcome)) => RoundResult::from_outcome(outcome, wait),
                (Ok(true), None) => match session.outcome(round).await {
                    Some(outcome) => RoundResult::from_outcome(outcome, wait),
                    None => Self::missing(round, wait, "finalized without a recorded outcome"),
                },
                (Ok(false), _) => Self::missing(round, wait, "finalize marker closed"),
                (Err(_), _) => Self::missing(round, wait, "finalize wait elapsed"),
            };
            tracing::debug!("Session {} batch round {}: {}", session.id(), result.round, result.reason);
            on_round(&result);
            rounds.push(result);
        }

        let successes = rounds.iter().filter(|r| r.success()).count();
        let total_rounds = rounds.len();
        let report = BatchReport {
            session_id: session.id().clone(),
            total_rounds,
            successes,
            failures: total_rounds - successes,
            empirical_rate: successes as f64 / total_rounds as f64,
            theoretical,
            rounds,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            "Session {} batch finished: {}/{} succeeded ({:.4}), deviation {:?}",
            report.session_id,
            report.successes,
            report.total_rounds,
            report.empirical_rate,
            report.deviation()
        );
        Ok(report)
    }

    fn missing(round: u64, wait: Duration, reason: &str) -> RoundResult {
        RoundResult {
            round,
            status: RoundStatus::TimeoutFailure,
            reason: reason.to_string(),
            failed_phase: None,
            membership: Membership::default(),
            message_count: 0,
            wait_ms: wait.as_millis() as u64,
        }
    }
}
