use pbft_sim::utils::logging;
use pbft_sim::{ExperimentOrchestrator, SessionRegistry};
use std::path::Path;

use super::utils::{default_config_path, log_configuration, prepare_results_dir, setup_logging};
use crate::config::Config;
use crate::simulation_results::{SimulationResults, SweepPoint};
use crate::{SimulatorError, RESULTS_ROOT};

const SCENARIO: &str = "sim_simple";

/// Runs one batch at the configured delivery rate and saves its comparison with theory
pub async fn run_simple_simulation(config_path: Option<&Path>) -> Result<SimulationResults, SimulatorError> {
    let dir = prepare_results_dir(RESULTS_ROOT, SCENARIO)?;
    setup_logging(&dir);

    let config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::load(default_config_path(SCENARIO))?,
    };
    log_configuration(SCENARIO, &config);

    let registry = SessionRegistry::new();
    let orchestrator = ExperimentOrchestrator::new(config.finalize_wait());
    let mut results = SimulationResults::new(
        SCENARIO,
        &config.session,
        config.experiment.rounds,
        config.experiment.custom_matrix.is_some(),
    );

    let (report, stats) = crate::run_simulation(
        &registry,
        &orchestrator,
        config.session.clone(),
        config.experiment.rounds,
        config.experiment.custom_matrix.clone(),
        config.experiment.report_every,
    )
    .await?;
    results.record(SweepPoint::from_report(config.session.delivery_rate, &report, &stats));

    let path = results.save(RESULTS_ROOT)?;
    results.print_summary();
    logging::log("SIMULATOR", &format!("Simple simulation finished, results in {}", path.display()));
    Ok(results)
}
