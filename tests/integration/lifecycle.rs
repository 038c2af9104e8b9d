use pbft_sim::session::SessionRegistry;
use pbft_sim::types::communication::SessionEvent;
use pbft_sim::types::{MessageKind, Phase, RoundStatus, SessionId};
use pbft_sim::utils::logging;
use pbft_sim::{BatchRequest, ConsensusSession, SessionConfig, SessionError};
use tokio::time::{sleep, Duration};

/// Tests round numbering over a mix of synchronous rounds and a batch:
/// - Round numbers strictly increase and every round is finalized once
/// - No message is tagged with a round below the last finalized one when it was logged
#[tokio::test]
async fn test_round_numbers_increase() {
    logging::log("TEST", "=== Starting test_round_numbers_increase ===");
    let registry = SessionRegistry::new();
    let id = registry
        .create(SessionConfig::new(7).with_delivery_rate(85.0).with_seed(3))
        .await
        .expect("valid config");

    for expected in 1..=5 {
        assert_eq!(registry.reset_round(&id).await.expect("session exists"), expected);
    }
    let report = registry.run_batch(&id, BatchRequest::new(20)).await.expect("batch runs");
    assert_eq!(report.rounds.first().map(|r| r.round), Some(6));
    assert_eq!(report.rounds.last().map(|r| r.round), Some(25));

    let snapshot = registry.snapshot(&id).await.expect("session exists");
    let rounds: Vec<u64> = snapshot.history.iter().map(|o| o.round).collect();
    assert_eq!(rounds, (1..=25).collect::<Vec<_>>());
    assert_eq!(snapshot.finalized_round, Some(25));

    // the log is append-only, so message rounds never decrease along it
    let mut highest = 0;
    for message in &snapshot.messages {
        assert!(message.round >= highest, "round {} logged after round {}", message.round, highest);
        highest = message.round;
    }

    let listing = registry.round_listing(&id).await.expect("session exists");
    assert_eq!(listing.current_round, 25);
    assert!(listing.rounds.windows(2).all(|w| w[0] < w[1]));

    let history = registry.round_history(&id, 12).await.expect("session exists");
    let outcome = history.outcome.expect("round 12 finalized");
    assert_eq!(outcome.message_count, history.messages.len());
    assert!(history.messages.iter().all(|m| m.round == 12));
    logging::log("TEST", "=== Test completed successfully ===");
}

/// Tests that every operation on a missing session reports it as not found
#[tokio::test]
async fn test_missing_session() {
    let registry = SessionRegistry::new();
    let id = registry.create(SessionConfig::new(4)).await.expect("valid config");
    registry.delete(&id).await.expect("session exists");

    assert!(matches!(registry.snapshot(&id).await, Err(SessionError::NotFound(_))));
    assert!(matches!(registry.reset_round(&id).await, Err(SessionError::NotFound(_))));
    assert!(matches!(registry.run_batch(&id, BatchRequest::new(1)).await, Err(SessionError::NotFound(_))));
    let other = SessionId("session-999".to_string());
    assert!(matches!(registry.round_history(&other, 1).await, Err(SessionError::NotFound(_))));
}

/// Tests an interactive round driven through the registry:
/// - A subscriber sees the new round and the phase updates
/// - An assigned node's prepare and commit carry the round to Success
#[tokio::test(start_paused = true)]
async fn test_interactive_round_through_registry() {
    let registry = SessionRegistry::new();
    let config = SessionConfig::new(4)
        .with_proposal(9, Some("transfer".to_string()))
        .with_interactive_nodes([3])
        .with_timings(Duration::from_secs(30), Duration::from_secs(2))
        .with_seed(1);
    let id = registry.create(config).await.expect("valid config");
    let session = registry.get(&id).await.expect("session exists");

    let node = session.assign_node().await.expect("node 3 is free");
    assert_eq!(node, 3);
    session.connect(node).await.expect("interactive node");
    let mut events = session.subscribe().await;

    assert_eq!(registry.reset_round(&id).await.expect("round starts"), 1);
    assert_eq!(events.receive().await, Some(SessionEvent::NewRound { round: 1 }));

    session.submit(node, MessageKind::Prepare { value: 9 }, false).await.expect("prepare accepted");
    sleep(Duration::from_secs(3)).await;
    assert_eq!(session.snapshot().await.phase, Phase::Commit);

    session.submit(node, MessageKind::Commit { value: 9 }, false).await.expect("commit accepted");
    sleep(Duration::from_secs(3)).await;

    let history = registry.round_history(&id, 1).await.expect("session exists");
    let outcome = history.outcome.expect("round finalized");
    assert_eq!(outcome.status, RoundStatus::Success);
    assert_eq!(outcome.committed, 4);

    let mut completed = false;
    while let Some(event) = events.try_receive() {
        if let SessionEvent::RoundCompleted { outcome } = event {
            assert_eq!(outcome.round, 1);
            completed = true;
        }
    }
    assert!(completed, "no round_completed notification");
}
