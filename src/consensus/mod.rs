//! Per-round consensus state machine.
//!
//! A round moves Pre-Prepare → Prepare → Commit → Completed. Quorum counting is
//! causally gated: a prepare counts only at a replica holding the pre-prepare,
//! a commit only at a replica that already reached the prepare threshold.

pub mod incremental;
pub mod machine;
pub mod quorum;
pub mod round;

pub use incremental::{Followup, IncrementalRound, Progress};
pub use machine::{RoundMachine, RoundVerdict};
pub use quorum::{Membership, QuorumRule};
pub use round::{NodeRuntimeState, RoundState, RoundTimer};

#[cfg(test)]
mod tests;
