use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::consensus::{NodeRuntimeState, QuorumRule, RoundMachine, RoundState};
use crate::reliability::{ReliabilityMatrix, ReliabilityModel, Topology};
use crate::types::{MessageLog, Phase, RoundStatus};

fn fresh_nodes(n: usize) -> Vec<NodeRuntimeState> {
    vec![NodeRuntimeState::default(); n]
}

#[test]
fn test_quorum_thresholds() {
    let cases = [(1, 0, 1, 0), (3, 0, 3, 0), (4, 1, 3, 2), (7, 2, 5, 4), (10, 3, 7, 6)];
    for (n, f, needed, k) in cases {
        let rule = QuorumRule::new(n);
        assert_eq!(rule.fault_tolerance(), f, "f for N={}", n);
        assert_eq!(rule.success_threshold(), needed, "N-f for N={}", n);
        assert_eq!(rule.prepare_threshold(), k);
        assert_eq!(rule.commit_threshold(), k);
    }
}

/// Tests a perfectly reliable round with N = 4:
/// - Every node pre-prepares, prepares and commits
/// - The log holds 3 pre-prepares, 9 prepares and 12 commits
#[test]
fn test_reliable_round_succeeds() {
    println!("\n=== Starting test_reliable_round_succeeds ===");
    let model = ReliabilityModel::new(4, Topology::Full, 1.0).expect("valid model");
    let machine = RoundMachine::new(QuorumRule::new(4), 0, 42, &model);
    let mut nodes = fresh_nodes(4);
    let mut log = MessageLog::new();
    let mut rng = StdRng::seed_from_u64(1);

    let verdict = machine.run(1, &mut nodes, &mut log, &mut rng);
    println!("[TEST]   Verdict: {:?}", verdict);

    assert_eq!(verdict.status, RoundStatus::Success);
    assert_eq!(verdict.failed_phase, None);
    assert_eq!(verdict.membership.pre_prepared, 4);
    assert_eq!(verdict.membership.prepared, 4);
    assert_eq!(verdict.membership.committed, 4);
    assert_eq!(log.len(), 3 + 9 + 12);
    assert_eq!(log.count_for_round(1), 24);
    assert!(log.all().iter().all(|m| m.delivered));
    // the proposer never prepares
    assert!(!nodes[0].sent_prepare);
    assert!(nodes.iter().all(|n| n.sent_commit));

    println!("=== Test completed successfully ===\n");
}

/// Tests a dead network: only the proposer holds the proposal
#[test]
fn test_dead_network_fails_at_pre_prepare() {
    let model = ReliabilityModel::new(4, Topology::Full, 0.0).expect("valid model");
    let machine = RoundMachine::new(QuorumRule::new(4), 0, 7, &model);
    let mut nodes = fresh_nodes(4);
    let mut log = MessageLog::new();
    let mut rng = StdRng::seed_from_u64(1);

    let verdict = machine.run(1, &mut nodes, &mut log, &mut rng);
    assert_eq!(verdict.status, RoundStatus::Failure);
    assert_eq!(verdict.failed_phase, Some(Phase::PrePrepare));
    assert_eq!(verdict.membership.pre_prepared, 1);
    assert!(verdict.reason.starts_with("pre-prepare"));
    assert_eq!(log.len(), 3);
    assert!(log.all().iter().all(|m| !m.delivered));
}

/// Tests causal gating of prepares:
/// - Node 3 never gets the pre-prepare
/// - Prepares delivered to node 3 are not counted
/// - Node 1 and node 2 see only one counted prepare each, so the prepare gate fails
#[test]
fn test_prepare_requires_pre_prepare() {
    println!("\n=== Starting test_prepare_requires_pre_prepare ===");
    let mut rows = vec![vec![1.0; 4]; 4];
    rows[0][3] = 0.0;
    let matrix = ReliabilityMatrix::new(rows).expect("valid matrix");
    let model = ReliabilityModel::from_matrix(&matrix).expect("valid model");
    let machine = RoundMachine::new(QuorumRule::new(4), 0, 1, &model);
    let mut nodes = fresh_nodes(4);
    let mut log = MessageLog::new();
    let mut rng = StdRng::seed_from_u64(3);

    let verdict = machine.run(1, &mut nodes, &mut log, &mut rng);
    println!("[TEST]   Node states: {:?}", nodes);

    assert_eq!(verdict.membership.pre_prepared, 3);
    assert!(!nodes[3].received_pre_prepare);
    assert_eq!(nodes[3].received_prepare_count, 0);
    assert_eq!(nodes[0].received_prepare_count, 2);
    assert_eq!(nodes[1].received_prepare_count, 1);
    assert_eq!(verdict.failed_phase, Some(Phase::Prepare));
    assert_eq!(verdict.membership.prepared, 1);

    println!("=== Test completed successfully ===\n");
}

/// Tests causal gating of commits: with N = 7 and node 6 cut off from the
/// proposer, node 6 never prepares and its received commits are not counted
#[test]
fn test_commit_requires_prepared() {
    let mut rows = vec![vec![1.0; 7]; 7];
    rows[0][6] = 0.0;
    let matrix = ReliabilityMatrix::new(rows).expect("valid matrix");
    let model = ReliabilityModel::from_matrix(&matrix).expect("valid model");
    let machine = RoundMachine::new(QuorumRule::new(7), 0, 1, &model);
    let mut nodes = fresh_nodes(7);
    let mut log = MessageLog::new();
    let mut rng = StdRng::seed_from_u64(5);

    let verdict = machine.run(1, &mut nodes, &mut log, &mut rng);
    assert_eq!(verdict.status, RoundStatus::Success);
    assert_eq!(verdict.membership.pre_prepared, 6);
    assert_eq!(verdict.membership.prepared, 6);
    assert_eq!(verdict.membership.committed, 6);
    assert_eq!(nodes[6].received_commit_count, 0);
    assert!(!nodes[6].sent_commit);
}

#[test]
fn test_round_state_lifecycle() {
    let mut state = RoundState::new();
    assert_eq!(state.round(), 0);
    assert_eq!(state.phase(), Phase::Waiting);
    assert!(!state.is_live());

    assert_eq!(state.advance(), 1);
    assert_eq!(state.phase(), Phase::PrePrepare);
    assert!(state.is_live());

    // only the live round, and only once
    assert!(!state.mark_finalized(2));
    assert!(state.mark_finalized(1));
    assert!(!state.mark_finalized(1));
    assert_eq!(state.phase(), Phase::Completed);
    assert_eq!(state.finalized_round(), Some(1));
    assert!(!state.is_live());

    assert_eq!(state.advance(), 2);
    assert!(state.is_live());
}

proptest! {
    /// Phase sets only ever shrink: |V_c| <= |V_p| <= |V_pp| <= N, and every
    /// committed node is prepared and every prepared node pre-prepared
    #[test]
    fn prop_phase_sets_are_nested(n in 1usize..=10, p in 0.0f64..=1.0, seed in any::<u64>()) {
        let model = ReliabilityModel::new(n, Topology::Full, p).expect("valid model");
        let rule = QuorumRule::new(n);
        let machine = RoundMachine::new(rule, 0, 9, &model);
        let mut nodes = fresh_nodes(n);
        let mut log = MessageLog::new();
        let mut rng = StdRng::seed_from_u64(seed);

        let verdict = machine.run(1, &mut nodes, &mut log, &mut rng);
        let m = verdict.membership;
        prop_assert!(m.committed <= m.prepared);
        prop_assert!(m.prepared <= m.pre_prepared);
        prop_assert!(m.pre_prepared <= n);
        for node in &nodes {
            if rule.is_committed(node) {
                prop_assert!(rule.is_prepared(node));
            }
            if rule.is_prepared(node) {
                prop_assert!(node.received_pre_prepare);
            }
        }
        prop_assert_eq!(verdict.status.is_success(), m.committed >= rule.success_threshold());
    }
}
