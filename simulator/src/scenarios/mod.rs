pub mod sim_simple;
pub mod sim_sweep_delivery_rate;
pub mod utils;

pub use sim_simple::run_simple_simulation;
pub use sim_sweep_delivery_rate::run_sweep_delivery_rate_simulation;
