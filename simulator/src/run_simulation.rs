use indicatif::{ProgressBar, ProgressStyle};
use pbft_sim::session::SessionConfig;
use pbft_sim::utils::logging;
use pbft_sim::{BatchReport, BatchRequest, ExperimentOrchestrator, ReliabilityMatrix, SessionRegistry};

use crate::stats::SimulatorStats;
use crate::SimulatorError;

// ------------------------------------------------------------------------------------------------
// Main Simulation Function
// ------------------------------------------------------------------------------------------------

/// Runs one batch of rounds on a fresh session
///
/// # Arguments
///
/// * `registry` - The registry the session is created in and removed from afterwards
/// * `session` - Configuration of the session the rounds run on
/// * `rounds` - Number of sequential rounds
/// * `custom_matrix` - Batch-scoped reliability matrix, if any
/// * `report_every` - Print running statistics every this many rounds
///
pub async fn run_simulation(
    registry: &SessionRegistry,
    orchestrator: &ExperimentOrchestrator,
    session: SessionConfig,
    rounds: usize,
    custom_matrix: Option<ReliabilityMatrix>,
    report_every: usize,
) -> Result<(BatchReport, SimulatorStats), SimulatorError> {
    let id = registry.create(session).await?;
    let node = registry.get(&id).await?;
    logging::log("SIMULATOR", &format!("Created session {} for {} rounds", id, rounds));

    // Create progress bar
    let progress_bar = ProgressBar::new(rounds as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} rounds ({eta})")
            .map_err(|e| SimulatorError::Progress(e.to_string()))?
            .progress_chars("##-"),
    );

    let mut stats = SimulatorStats::new();
    let mut request = BatchRequest::new(rounds);
    if let Some(matrix) = custom_matrix {
        request = request.with_custom_matrix(matrix);
    }

    let outcome = orchestrator
        .run_with_progress(&node, request, |result| {
            stats.record_round(result);
            progress_bar.inc(1);
            if stats.total_rounds() % report_every == 0 {
                progress_bar.suspend(|| stats.print_progress());
            }
        })
        .await;
    progress_bar.finish();

    // the session is not needed past its batch
    registry.delete(&id).await?;
    let report = outcome?;
    stats.print_final_stats();
    Ok((report, stats))
}
