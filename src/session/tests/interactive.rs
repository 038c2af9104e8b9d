use tokio::time::{sleep, Duration};

use crate::session::{ConsensusSession, SessionConfig, SessionError, SessionNode};
use crate::types::{MessageError, MessageKind, Phase, RoundStatus, SessionId};

fn interactive_session(n: usize, interactive: &[usize], delivery_rate: f64) -> SessionNode {
    let config = SessionConfig::new(n)
        .with_proposal(7, None)
        .with_delivery_rate(delivery_rate)
        .with_interactive_nodes(interactive.iter().copied())
        .with_timings(Duration::from_secs(5), Duration::from_secs(1))
        .with_seed(11);
    SessionNode::new(SessionId("interactive".to_string()), config).expect("valid config")
}

/// Tests an interactive round with node 3 driven from outside:
/// - Simulated prepares alone leave the round in Prepare
/// - The interactive prepare moves the round to Commit
/// - Simulated commits then finalize it as Success before the timeout
#[tokio::test(start_paused = true)]
async fn test_interactive_round_commits() {
    println!("\n=== Starting test_interactive_round_commits ===");
    let session = interactive_session(4, &[3], 100.0);

    assert_eq!(session.reset_round().await.expect("round starts"), 1);
    assert_eq!(session.snapshot().await.phase, Phase::Prepare);

    sleep(Duration::from_millis(1500)).await;
    let snapshot = session.snapshot().await;
    println!("[TEST]   After simulated prepares: {:?}", snapshot.nodes);
    assert_eq!(snapshot.phase, Phase::Prepare);
    assert!(snapshot.history.is_empty());

    session.submit(3, MessageKind::Prepare { value: 7 }, false).await.expect("prepare accepted");
    assert_eq!(session.snapshot().await.phase, Phase::Commit);

    sleep(Duration::from_secs(2)).await;
    let outcome = session.outcome(1).await.expect("round finalized");
    println!("[TEST]   Outcome: {:?}", outcome);
    assert_eq!(outcome.status, RoundStatus::Success);
    assert_eq!(outcome.committed, 4);

    // the timer was cancelled; nothing changes when it would have fired
    sleep(Duration::from_secs(10)).await;
    assert_eq!(session.snapshot().await.history.len(), 1);

    println!("=== Test completed successfully ===\n");
}

/// Tests that a round nobody answers times out
#[tokio::test(start_paused = true)]
async fn test_interactive_round_times_out() {
    let session = interactive_session(4, &[1, 2, 3], 100.0);
    session.reset_round().await.expect("round starts");

    sleep(Duration::from_secs(4)).await;
    assert!(session.outcome(1).await.is_none());

    sleep(Duration::from_secs(2)).await;
    let outcome = session.outcome(1).await.expect("round finalized");
    assert_eq!(outcome.status, RoundStatus::TimeoutFailure);
    assert!(outcome.reason.starts_with("timeout"));
    assert_eq!(outcome.failed_phase, Some(Phase::Prepare));
    assert_eq!(session.snapshot().await.phase, Phase::Completed);
}

/// Tests round-bound timers:
/// - Starting round 2 closes round 1 and cancels its timer
/// - Round 2 times out on its own schedule
#[tokio::test(start_paused = true)]
async fn test_stale_timer_is_ignored() {
    let session = interactive_session(4, &[1, 2, 3], 100.0);
    session.reset_round().await.expect("round starts");
    sleep(Duration::from_secs(3)).await;
    assert_eq!(session.reset_round().await.expect("round starts"), 2);

    let first = session.outcome(1).await.expect("round 1 closed");
    assert_eq!(first.status, RoundStatus::Failure);
    assert!(first.reason.starts_with("abandoned"));

    // round 1's timer would have fired at t=5
    sleep(Duration::from_secs(3)).await;
    assert!(session.outcome(2).await.is_none());
    assert_eq!(session.snapshot().await.round, 2);

    sleep(Duration::from_secs(3)).await;
    let second = session.outcome(2).await.expect("round 2 finalized");
    assert_eq!(second.status, RoundStatus::TimeoutFailure);
    assert_eq!(session.snapshot().await.history.len(), 2);
}

/// A dead network fails an interactive round at the gate, without waiting for the timer
#[tokio::test(start_paused = true)]
async fn test_interactive_gate_failure() {
    let session = interactive_session(4, &[3], 0.0);
    session.reset_round().await.expect("round starts");
    let outcome = session.outcome(1).await.expect("round finalized");
    assert_eq!(outcome.status, RoundStatus::Failure);
    assert_eq!(outcome.pre_prepared, 1);
}

/// Tests that a prepare with a different value is logged as byzantine and never counted
#[tokio::test(start_paused = true)]
async fn test_byzantine_submission() {
    let session = interactive_session(4, &[1, 2, 3], 100.0);
    session.reset_round().await.expect("round starts");

    session.submit(2, MessageKind::Prepare { value: 666 }, true).await.expect("accepted");
    let snapshot = session.snapshot().await;
    let flagged: Vec<_> = snapshot.messages.iter().filter(|m| m.byzantine).collect();
    assert_eq!(flagged.len(), 3);
    assert!(flagged.iter().all(|m| m.kind.value() == 666));
    assert!(snapshot.nodes.iter().all(|n| n.received_prepare_count == 0));
}

/// Tests submission errors
#[tokio::test(start_paused = true)]
async fn test_submit_errors() {
    let session = interactive_session(4, &[2, 3], 100.0);

    let result = session.submit(3, MessageKind::Prepare { value: 7 }, false).await;
    assert!(matches!(result, Err(SessionError::NoLiveRound)));

    session.reset_round().await.expect("round starts");
    let result = session.submit(1, MessageKind::Prepare { value: 7 }, false).await;
    assert!(matches!(result, Err(SessionError::NotInteractive(1))));

    let result = session.submit(9, MessageKind::Commit { value: 7 }, false).await;
    assert!(matches!(result, Err(SessionError::InvalidNode { node: 9, node_count: 4 })));

    let result = session.submit(2, MessageKind::PrePrepare { value: 7, content: None }, false).await;
    assert!(matches!(
        result,
        Err(SessionError::Message(MessageError::NotProposer { from: 2, proposer: 0 }))
    ));
}

/// Tests that one node cannot stand in for a quorum:
/// - The proposer never sends prepare
/// - A second prepare or commit from the same node is rejected and changes nothing
/// - An honest commit before the node is prepared is rejected
#[tokio::test(start_paused = true)]
async fn test_repeated_and_premature_submissions_are_rejected() {
    let session = interactive_session(4, &[0, 1, 2, 3], 100.0);
    session.reset_round().await.expect("round starts");

    let result = session.submit(0, MessageKind::Prepare { value: 7 }, false).await;
    assert!(matches!(result, Err(SessionError::Message(MessageError::ProposerPrepare(0)))));

    session.submit(1, MessageKind::Prepare { value: 7 }, false).await.expect("first prepare accepted");
    let before = session.snapshot().await;

    for _ in 0..5 {
        let result = session.submit(1, MessageKind::Prepare { value: 7 }, false).await;
        assert!(matches!(
            result,
            Err(SessionError::Message(MessageError::Duplicate { from: 1, phase: Phase::Prepare }))
        ));
    }
    let result = session.submit(1, MessageKind::Commit { value: 7 }, false).await;
    assert!(matches!(result, Err(SessionError::Message(MessageError::NotPrepared(1)))));

    let after = session.snapshot().await;
    assert_eq!(after.nodes, before.nodes);
    assert_eq!(after.messages.len(), before.messages.len());
    assert_eq!(after.phase, Phase::Prepare);

    // prepared through two other nodes, node 1 may commit once
    session.submit(2, MessageKind::Prepare { value: 7 }, false).await.expect("prepare accepted");
    session.submit(3, MessageKind::Prepare { value: 7 }, false).await.expect("prepare accepted");
    session.submit(1, MessageKind::Commit { value: 7 }, false).await.expect("commit accepted");
    let result = session.submit(1, MessageKind::Commit { value: 7 }, false).await;
    assert!(matches!(
        result,
        Err(SessionError::Message(MessageError::Duplicate { from: 1, phase: Phase::Commit }))
    ));
    assert!(session.outcome(1).await.is_none());
}

/// Tests that f+1 distinct nodes committing another value fail the round at once
#[tokio::test(start_paused = true)]
async fn test_conflicting_commits_fail_the_round() {
    let session = interactive_session(4, &[2, 3], 100.0);
    session.reset_round().await.expect("round starts");

    session.submit(2, MessageKind::Commit { value: 99 }, true).await.expect("accepted");
    assert!(session.outcome(1).await.is_none());

    session.submit(3, MessageKind::Commit { value: 98 }, true).await.expect("accepted");
    let outcome = session.outcome(1).await.expect("round finalized");
    println!("[TEST]   Outcome: {:?}", outcome);
    assert_eq!(outcome.status, RoundStatus::Failure);
    assert_eq!(outcome.failed_phase, Some(Phase::Commit));
    assert!(outcome.reason.starts_with("commit: 2 nodes committed a conflicting value"));
}

/// Tests handing interactive nodes over to the simulation:
/// - Handed-over nodes send their prepares and commits after the delay
/// - Their driver can no longer submit for the round
/// - The next round drives them from outside again
#[tokio::test(start_paused = true)]
async fn test_hand_over_plays_the_rest_of_the_round() {
    let session = interactive_session(4, &[1, 2, 3], 100.0);
    session.reset_round().await.expect("round starts");

    for node in 1..=3 {
        session.hand_over(node).await.expect("interactive node");
    }
    assert_eq!(session.snapshot().await.handed_over, vec![1, 2, 3]);
    let result = session.submit(1, MessageKind::Prepare { value: 7 }, false).await;
    assert!(matches!(result, Err(SessionError::HandedOver(1))));
    assert!(matches!(session.hand_over(0).await, Err(SessionError::NotInteractive(0))));

    sleep(Duration::from_secs(3)).await;
    let outcome = session.outcome(1).await.expect("round finalized");
    assert_eq!(outcome.status, RoundStatus::Success);
    assert_eq!(outcome.committed, 4);

    session.reset_round().await.expect("round starts");
    sleep(Duration::from_millis(1500)).await;
    let snapshot = session.snapshot().await;
    assert!(snapshot.handed_over.is_empty());
    assert_eq!(snapshot.phase, Phase::Prepare);
    assert!(snapshot.nodes[1..].iter().all(|n| !n.sent_prepare));
}

/// Tests the connected-node roster and node assignment
#[tokio::test]
async fn test_connect_and_assign() {
    let session = interactive_session(5, &[2, 4], 100.0);

    assert_eq!(session.assign_node().await.expect("free node"), 2);
    assert_eq!(session.connect(2).await.expect("interactive"), vec![2]);
    assert_eq!(session.assign_node().await.expect("free node"), 4);
    assert_eq!(session.connect(4).await.expect("interactive"), vec![2, 4]);
    assert!(matches!(session.assign_node().await, Err(SessionError::NoFreeNode)));

    assert_eq!(session.disconnect(2).await.expect("interactive"), vec![4]);
    assert!(matches!(session.connect(0).await, Err(SessionError::NotInteractive(0))));
    assert_eq!(session.snapshot().await.connected, vec![4]);
}
