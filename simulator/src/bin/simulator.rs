use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;

use simulator::{run_simple_simulation, run_sweep_delivery_rate_simulation, SimulationType, SimulatorInterface};

// ------------------------------------------------------------------------------------------------
// Main
// ------------------------------------------------------------------------------------------------

/// Usage: `simulator [scenario] [config.toml]`
///
/// Without arguments the interactive menu is shown.
#[tokio::main]
async fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(scenario) = args.next() else {
        return SimulatorInterface::new().run_interactive().await.context("Interactive run failed");
    };
    let config_path = args.next().map(PathBuf::from);

    match SimulationType::from_input(&scenario) {
        Some(SimulationType::Simple) => {
            run_simple_simulation(config_path.as_deref()).await.context("Simple simulation failed")?;
        }
        Some(SimulationType::SweepDeliveryRate) => {
            run_sweep_delivery_rate_simulation(config_path.as_deref())
                .await
                .context("Delivery rate sweep failed")?;
        }
        Some(SimulationType::Exit) => {}
        None => return Err(anyhow!("Unknown scenario '{}', expected 'simple' or 'sweep_delivery_rate'", scenario)),
    }
    Ok(())
}
