//! Configuration loader and validator for the PBFT batch simulator.
//! Handles parsing, validation, and access to simulation configuration files.

use pbft_sim::session::{ConfigError as SessionConfigError, SessionConfig};
use pbft_sim::ReliabilityMatrix;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Main Configuration Structs
// ------------------------------------------------------------------------------------------------

/// Main configuration struct for simulation parameters.
///
/// `[session]` is the session every batch runs on, `[experiment]` describes the
/// batch itself, and the optional `[sweep]` table turns a run into a series of
/// batches over increasing delivery rates.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub session: SessionConfig,
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub sweep: Option<SweepParameters>,
}

fn default_finalize_wait_secs() -> f64 {
    5.0
}

fn default_report_every() -> usize {
    100
}

/// Configuration of one batch of rounds
#[derive(Debug, Deserialize, Clone)]
pub struct ExperimentConfig {
    /// Number of sequential rounds per batch
    pub rounds: usize,
    /// Bound on the wait for each round's finalize marker, in seconds
    #[serde(default = "default_finalize_wait_secs")]
    pub finalize_wait_secs: f64,
    /// Batch-scoped reliability matrix, replacing the session topology
    #[serde(default)]
    pub custom_matrix: Option<ReliabilityMatrix>,
    /// Print running statistics every this many rounds
    #[serde(default = "default_report_every")]
    pub report_every: usize,
}

/// Parameters of a delivery-rate sweep.
///
/// Batch `i` runs with `delivery_rate_start + i * delivery_rate_step`.
#[derive(Debug, Deserialize, Clone)]
pub struct SweepParameters {
    /// Total number of batches in the sweep
    pub num_simulations: usize,
    /// Delivery rate of the first batch, 0-100
    pub delivery_rate_start: f64,
    /// Increment between batches, in percentage points
    pub delivery_rate_step: f64,
}

// ------------------------------------------------------------------------------------------------
// Error Types and Validation
// ------------------------------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
    #[error("Invalid session configuration: {0}")]
    SessionError(#[from] SessionConfigError),
}

// ------------------------------------------------------------------------------------------------
// Configuration Implementation Methods
// ------------------------------------------------------------------------------------------------

impl Config {
    /// Read, parse and validate the TOML file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        if self.experiment.rounds == 0 {
            return Err(ConfigError::ValidationError("Number of rounds must be positive".into()));
        }
        if !self.experiment.finalize_wait_secs.is_finite() || self.experiment.finalize_wait_secs <= 0.0 {
            return Err(ConfigError::ValidationError("Finalize wait must be positive".into()));
        }
        if self.experiment.report_every == 0 {
            return Err(ConfigError::ValidationError("Report interval must be positive".into()));
        }
        if let Some(matrix) = &self.experiment.custom_matrix {
            matrix
                .ensure_dimension(self.session.node_count)
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }
        if let Some(sweep) = &self.sweep {
            sweep.validate()?;
        }
        Ok(())
    }

    pub fn finalize_wait(&self) -> Duration {
        Duration::from_secs_f64(self.experiment.finalize_wait_secs)
    }

    /// The session configuration with `delivery_rate` in place of the configured one
    pub fn session_at(&self, delivery_rate: f64) -> SessionConfig {
        let mut session = self.session.clone();
        session.delivery_rate = delivery_rate;
        session
    }
}

impl SweepParameters {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.num_simulations == 0 {
            return Err(ConfigError::ValidationError("Number of simulations must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.delivery_rate_start) {
            return Err(ConfigError::ValidationError("Sweep start must be between 0 and 100".into()));
        }
        if self.delivery_rate_step <= 0.0 {
            return Err(ConfigError::ValidationError("Sweep step must be positive".into()));
        }
        let last = self.delivery_rate_start + self.delivery_rate_step * (self.num_simulations - 1) as f64;
        if last > 100.0 + 1e-9 {
            return Err(ConfigError::ValidationError(format!(
                "Sweep would reach a delivery rate of {}, above 100",
                last
            )));
        }
        Ok(())
    }

    /// Delivery rates of every batch, in order
    pub fn values(&self) -> Vec<f64> {
        (0..self.num_simulations)
            .map(|i| (self.delivery_rate_start + self.delivery_rate_step * i as f64).min(100.0))
            .collect()
    }
}
