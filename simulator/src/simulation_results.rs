//! Results of a simulator run and their JSON export.

use chrono::{DateTime, Local};
use pbft_sim::probability::Method;
use pbft_sim::utils::logging;
use pbft_sim::{BatchReport, SessionConfig, Topology};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::stats::SimulatorStats;

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("Failed to write results: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Session parameters recorded next to the results
#[derive(Debug, Clone, Serialize)]
pub struct RunParameters {
    pub node_count: usize,
    pub topology: Topology,
    pub proposer: usize,
    pub rounds: usize,
    pub custom_matrix: bool,
    pub seed: Option<u64>,
}

/// One batch of a run
#[derive(Debug, Clone, Serialize)]
pub struct SweepPoint {
    pub delivery_rate: f64,
    pub total_rounds: usize,
    pub successes: usize,
    pub empirical_rate: f64,
    pub theoretical_rate: Option<f64>,
    pub method: Option<Method>,
    pub deviation: Option<f64>,
    pub failures_by_phase: BTreeMap<String, usize>,
    pub duration_ms: i64,
}

impl SweepPoint {
    pub fn from_report(delivery_rate: f64, report: &BatchReport, stats: &SimulatorStats) -> Self {
        Self {
            delivery_rate,
            total_rounds: report.total_rounds,
            successes: report.successes,
            empirical_rate: report.empirical_rate,
            theoretical_rate: report.theoretical.map(|t| t.probability),
            method: report.theoretical.map(|t| t.method),
            deviation: report.deviation(),
            failures_by_phase: stats.failures_by_phase().clone(),
            duration_ms: (report.finished_at - report.started_at).num_milliseconds(),
        }
    }
}

/// Everything one scenario produced
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResults {
    pub scenario: String,
    pub parameters: RunParameters,
    pub points: Vec<SweepPoint>,
    pub started_at: DateTime<Local>,
}

impl SimulationResults {
    pub fn new(scenario: &str, session: &SessionConfig, rounds: usize, custom_matrix: bool) -> Self {
        Self {
            scenario: scenario.to_string(),
            parameters: RunParameters {
                node_count: session.node_count,
                topology: session.topology,
                proposer: session.proposer,
                rounds,
                custom_matrix,
                seed: session.seed,
            },
            points: Vec::new(),
            started_at: Local::now(),
        }
    }

    pub fn record(&mut self, point: SweepPoint) {
        logging::log(
            "SIMULATOR",
            &format!(
                "delivery rate {}: empirical {:.4}, theoretical {:?}",
                point.delivery_rate, point.empirical_rate, point.theoretical_rate
            ),
        );
        self.points.push(point);
    }

    /// Directory the scenario's data files go to
    pub fn data_dir(&self, root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(&self.scenario).join("data")
    }

    /// Write `simulation_results.json` under `<root>/<scenario>/data/` and return its path
    pub fn save(&self, root: impl AsRef<Path>) -> Result<PathBuf, ResultsError> {
        let dir = self.data_dir(root);
        fs::create_dir_all(&dir)?;
        let path = dir.join("simulation_results.json");
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        logging::log("SIMULATOR", &format!("Saved simulation results to {}", path.display()));
        Ok(path)
    }

    pub fn print_summary(&self) {
        println!("SIMULATOR: === {} ===", self.scenario);
        println!("SIMULATOR: {:>10} {:>10} {:>12} {:>10}", "rate", "empirical", "theoretical", "deviation");
        for point in &self.points {
            println!(
                "SIMULATOR: {:>10.2} {:>10.4} {:>12} {:>10}",
                point.delivery_rate,
                point.empirical_rate,
                point.theoretical_rate.map(|t| format!("{:.4}", t)).unwrap_or_else(|| "-".into()),
                point.deviation.map(|d| format!("{:+.4}", d)).unwrap_or_else(|| "-".into()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_writes_json() {
        let session = SessionConfig::new(4);
        let results = SimulationResults::new("sim_test_results", &session, 10, false);
        let root = std::env::temp_dir().join(format!("pbft-sim-results-{}", std::process::id()));

        let path = results.save(&root).expect("results saved");
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("file exists")).expect("valid json");
        assert_eq!(written["scenario"], "sim_test_results");
        assert_eq!(written["parameters"]["node_count"], 4);
        assert!(written["points"].as_array().expect("points array").is_empty());

        fs::remove_dir_all(root).ok();
    }
}
