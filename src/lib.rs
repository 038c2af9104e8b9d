pub mod consensus;
pub mod orchestrator;
pub mod probability;
pub mod reliability;
pub mod session;
pub mod types;
pub mod utils;

pub use orchestrator::{BatchReport, BatchRequest, ExperimentOrchestrator};
pub use probability::ProbabilityEngine;
pub use reliability::{ReliabilityMatrix, ReliabilityModel, Topology};
pub use session::{ConsensusSession, SessionConfig, SessionError, SessionRegistry};
