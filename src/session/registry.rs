use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::{ConsensusSession, RoundHistory, RoundListing, SessionConfig, SessionError, SessionNode, SessionSnapshot};
use crate::orchestrator::{BatchReport, BatchRequest, ExperimentOrchestrator};
use crate::types::SessionId;

/// Owns every live session, keyed by id
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionNode>>,
    next_id: AtomicU64,
    orchestrator: ExperimentOrchestrator,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose batches use `orchestrator`
    pub fn with_orchestrator(orchestrator: ExperimentOrchestrator) -> Self {
        Self { orchestrator, ..Self::default() }
    }

    /// Validate `config` and register a new session in the Waiting phase
    pub async fn create(&self, config: SessionConfig) -> Result<SessionId, SessionError> {
        let id = SessionId(format!("session-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
        let node = SessionNode::new(id.clone(), config)?;
        self.sessions.write().await.insert(id.clone(), node);
        Ok(id)
    }

    /// Handle to a session; the registry lock is released before it is used
    pub async fn get(&self, id: &SessionId) -> Result<SessionNode, SessionError> {
        self.sessions.read().await.get(id).cloned().ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    pub async fn snapshot(&self, id: &SessionId) -> Result<SessionSnapshot, SessionError> {
        Ok(self.get(id).await?.snapshot().await)
    }

    /// Snapshots of every session, ordered by id
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let nodes: Vec<SessionNode> = self.sessions.read().await.values().cloned().collect();
        let mut snapshots = join_all(nodes.iter().map(|node| node.snapshot())).await;
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        snapshots
    }

    /// Remove a session and stop its timer
    pub async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        let node = self.sessions.write().await.remove(id).ok_or_else(|| SessionError::NotFound(id.clone()))?;
        node.shutdown().await;
        tracing::info!("Session {} deleted", id);
        Ok(())
    }

    pub async fn reset_round(&self, id: &SessionId) -> Result<u64, SessionError> {
        self.get(id).await?.reset_round().await
    }

    pub async fn round_listing(&self, id: &SessionId) -> Result<RoundListing, SessionError> {
        Ok(self.get(id).await?.round_listing().await)
    }

    pub async fn round_history(&self, id: &SessionId, round: u64) -> Result<RoundHistory, SessionError> {
        Ok(self.get(id).await?.round_history(round).await)
    }

    /// Run a batch of sequential synchronous rounds on a session
    pub async fn run_batch(&self, id: &SessionId, request: BatchRequest) -> Result<BatchReport, SessionError> {
        let node = self.get(id).await?;
        self.orchestrator.run(&node, request).await
    }
}
