use pbft_sim::probability::Method;
use pbft_sim::session::SessionRegistry;
use pbft_sim::{BatchRequest, ProbabilityEngine, ReliabilityMatrix, SessionConfig, Topology};

const ROUNDS: usize = 2000;
const TOLERANCE: f64 = 0.03;

/// Tests that a seeded full-mesh batch lands on the closed-form rate:
/// - N = 7, p = 0.95, theory close to 0.845
/// - Empirical rate within three percentage points
#[tokio::test]
async fn test_full_mesh_matches_closed_form() {
    println!("\n=== Starting test_full_mesh_matches_closed_form ===");
    let registry = SessionRegistry::new();
    let config = SessionConfig::new(7).with_delivery_rate(95.0).with_proposal(1, None).with_seed(2024);
    let id = registry.create(config.clone()).await.expect("valid config");

    let report = registry.run_batch(&id, BatchRequest::new(ROUNDS)).await.expect("batch runs");
    let theoretical = report.theoretical.expect("closed form applies");
    println!(
        "[TEST]   empirical {:.4}, theoretical {:.4}",
        report.empirical_rate, theoretical.probability
    );

    assert_eq!(theoretical.method, Method::ClosedForm);
    let engine = ProbabilityEngine::new(config.quorum(), config.proposer).expect("valid proposer");
    assert!((theoretical.probability - engine.closed_form(0.95)).abs() < 1e-12);
    assert!((theoretical.probability - 0.845).abs() < 0.01);
    assert_eq!(report.successes + report.failures, ROUNDS);
    assert!(report.deviation().expect("theory present").abs() < TOLERANCE);
    println!("=== Test completed successfully ===\n");
}

/// Tests that a seeded ring batch lands on the exact rate:
/// - N = 6 ring, p = 0.9, exact value close to 0.9209
#[tokio::test]
async fn test_ring_matches_exact() {
    let registry = SessionRegistry::new();
    let config = SessionConfig::new(6)
        .with_topology(Topology::Ring)
        .with_delivery_rate(90.0)
        .with_seed(77);
    let id = registry.create(config).await.expect("valid config");

    let report = registry.run_batch(&id, BatchRequest::new(ROUNDS)).await.expect("batch runs");
    let theoretical = report.theoretical.expect("exact engine applies");
    assert_eq!(theoretical.method, Method::Exact);
    assert!((theoretical.probability - 0.920850).abs() < 1e-4);
    assert!((report.empirical_rate - theoretical.probability).abs() < TOLERANCE);
}

/// Tests a batch-scoped matrix on a full-mesh session:
/// - The batch follows the matrix, not the session's own links
/// - Later rounds go back to the session's links
#[tokio::test]
async fn test_batch_matrix_is_scoped() {
    let registry = SessionRegistry::new();
    let id = registry.create(SessionConfig::new(4).with_seed(9)).await.expect("valid config");

    let dead = ReliabilityMatrix::uniform(4, 0.0).expect("valid matrix");
    let report = registry
        .run_batch(&id, BatchRequest::new(50).with_custom_matrix(dead))
        .await
        .expect("batch runs");
    assert_eq!(report.successes, 0);
    assert_eq!(report.theoretical.map(|t| t.probability), Some(0.0));

    let report = registry.run_batch(&id, BatchRequest::new(50)).await.expect("batch runs");
    assert_eq!(report.successes, 50);
    assert_eq!(report.rounds[0].round, 51);
}
