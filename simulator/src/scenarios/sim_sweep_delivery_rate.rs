use pbft_sim::utils::logging;
use pbft_sim::{ExperimentOrchestrator, SessionRegistry};
use std::path::Path;

use super::utils::{default_config_path, log_configuration, prepare_results_dir, setup_logging};
use crate::config::{Config, ConfigError};
use crate::simulation_results::{SimulationResults, SweepPoint};
use crate::{SimulatorError, RESULTS_ROOT};

const SCENARIO: &str = "sim_sweep_delivery_rate";

/// Runs one batch per delivery rate of the `[sweep]` table, each on a fresh session
pub async fn run_sweep_delivery_rate_simulation(config_path: Option<&Path>) -> Result<SimulationResults, SimulatorError> {
    let dir = prepare_results_dir(RESULTS_ROOT, SCENARIO)?;
    setup_logging(&dir);

    let config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::load(default_config_path(SCENARIO))?,
    };
    let sweep = config
        .sweep
        .clone()
        .ok_or_else(|| ConfigError::ValidationError("Sweep scenario needs a [sweep] table".into()))?;
    log_configuration(SCENARIO, &config);

    let registry = SessionRegistry::new();
    let orchestrator = ExperimentOrchestrator::new(config.finalize_wait());
    let mut results = SimulationResults::new(
        SCENARIO,
        &config.session,
        config.experiment.rounds,
        config.experiment.custom_matrix.is_some(),
    );

    let values = sweep.values();
    for (i, delivery_rate) in values.iter().copied().enumerate() {
        println!("SIMULATOR: Batch {}/{} at delivery rate {}%", i + 1, values.len(), delivery_rate);
        let (report, stats) = crate::run_simulation(
            &registry,
            &orchestrator,
            config.session_at(delivery_rate),
            config.experiment.rounds,
            config.experiment.custom_matrix.clone(),
            config.experiment.report_every,
        )
        .await?;
        results.record(SweepPoint::from_report(delivery_rate, &report, &stats));
    }

    let path = results.save(RESULTS_ROOT)?;
    results.print_summary();
    logging::log("SIMULATOR", &format!("Delivery rate sweep finished, results in {}", path.display()));
    Ok(results)
}
