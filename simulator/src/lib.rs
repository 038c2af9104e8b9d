pub mod config;
pub mod interface;
pub mod run_simulation;
pub mod scenarios;
pub mod simulation_results;
pub mod stats;

use thiserror::Error;

pub use config::{Config, ConfigError};
pub use interface::{SimulationType, SimulatorInterface};
pub use run_simulation::run_simulation;
pub use scenarios::{run_simple_simulation, run_sweep_delivery_rate_simulation};
pub use simulation_results::{SimulationResults, SweepPoint};
pub use stats::SimulatorStats;

/// Results of every scenario are written below this directory
pub const RESULTS_ROOT: &str = "simulator/results";

#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Session error: {0}")]
    Session(#[from] pbft_sim::SessionError),
    #[error(transparent)]
    Results(#[from] simulation_results::ResultsError),
    #[error("Progress bar template error: {0}")]
    Progress(String),
    #[error("Failed to read input: {0}")]
    Input(#[from] std::io::Error),
}
