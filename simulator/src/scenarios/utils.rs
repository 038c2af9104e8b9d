use chrono::Local;
use pbft_sim::utils::logging;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::SimulatorError;

/// Default location of a scenario's config file
pub fn default_config_path(scenario: &str) -> PathBuf {
    Path::new("simulator/src/scenarios").join(scenario).join("config.toml")
}

/// Create `<root>/<scenario>/data` and return the scenario directory
pub fn prepare_results_dir(root: &str, scenario: &str) -> Result<PathBuf, SimulatorError> {
    let dir = Path::new(root).join(scenario);
    fs::create_dir_all(dir.join("data")).map_err(crate::simulation_results::ResultsError::from)?;
    Ok(dir)
}

/// Sets up logging to `<dir>/simulation.log` if the ENABLE_LOGS environment variable is set
pub fn setup_logging(dir: &Path) {
    if env::var("ENABLE_LOGS").is_ok() {
        let log_path = dir.join("simulation.log");
        if let Err(e) = fs::remove_file(&log_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                eprintln!("Error deleting log file: {}", e);
            }
        }

        env::set_var("PBFT_LOGGING", "true");
        env::set_var("PBFT_LOG_TO_FILE", "true");
        env::set_var("PBFT_LOG_FILE", &log_path);
        logging::init_logging();
    }
}

pub fn log_configuration(scenario: &str, config: &Config) {
    logging::log("SIMULATOR", "=== Simulation Configuration ===");
    logging::log("SIMULATOR", &format!("Scenario: {}", scenario));
    logging::log("SIMULATOR", &format!("Start Time: {}", Local::now().format("%Y-%m-%d %H:%M:%S")));
    logging::log("SIMULATOR", &format!("Nodes: {}", config.session.node_count));
    logging::log("SIMULATOR", &format!("Topology: {}", config.session.topology));
    logging::log("SIMULATOR", &format!("Proposer: {}", config.session.proposer));
    logging::log("SIMULATOR", &format!("Delivery Rate: {}%", config.session.delivery_rate));
    logging::log("SIMULATOR", &format!("Rounds per Batch: {}", config.experiment.rounds));
    logging::log("SIMULATOR", &format!("Custom Matrix: {}", config.experiment.custom_matrix.is_some()));
    if let Some(seed) = config.session.seed {
        logging::log("SIMULATOR", &format!("Seed: {}", seed));
    }
    logging::log("SIMULATOR", "=============================");
}
