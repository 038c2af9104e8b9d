//! Round statistics tracking for the PBFT simulator.
//! Tracks success counts, failure reasons and message volume during a batch.

use pbft_sim::orchestrator::RoundResult;
use pbft_sim::types::RoundStatus;
use std::collections::BTreeMap;
use std::time::Instant;

// ------------------------------------------------------------------------------------------------
// Statistics Tracking
// ------------------------------------------------------------------------------------------------

/// Running statistics of one batch
pub struct SimulatorStats {
    /// Rounds recorded so far
    total_rounds: usize,
    /// Rounds that reached Success
    successes: usize,
    /// Rounds that ended because the finalize wait or the round timer elapsed
    timeouts: usize,
    /// Failure count per phase at which the round stalled
    failures_by_phase: BTreeMap<String, usize>,
    /// Messages recorded over all rounds
    total_messages: usize,
    /// When the batch started, used to calculate rounds per second
    start_time: Instant,
}

impl Default for SimulatorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorStats {
    pub fn new() -> Self {
        Self {
            total_rounds: 0,
            successes: 0,
            timeouts: 0,
            failures_by_phase: BTreeMap::new(),
            total_messages: 0,
            start_time: Instant::now(),
        }
    }

    /// Records one round result
    pub fn record_round(&mut self, result: &RoundResult) {
        self.total_rounds += 1;
        self.total_messages += result.message_count;
        match result.status {
            RoundStatus::Success => self.successes += 1,
            RoundStatus::TimeoutFailure => self.timeouts += 1,
            _ => {
                let phase = result.failed_phase.map_or_else(|| "unknown".to_string(), |phase| phase.to_string());
                *self.failures_by_phase.entry(phase).or_insert(0) += 1;
            }
        }
    }

    pub fn total_rounds(&self) -> usize {
        self.total_rounds
    }

    pub fn successes(&self) -> usize {
        self.successes
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_rounds == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_rounds as f64
        }
    }

    pub fn failures_by_phase(&self) -> &BTreeMap<String, usize> {
        &self.failures_by_phase
    }

    /// Prints a one-line progress summary
    pub fn print_progress(&self) {
        println!(
            "SIMULATOR: {} rounds, {} succeeded ({:.2}%), {} timed out, {:.1} messages/round",
            self.total_rounds,
            self.successes,
            self.success_rate() * 100.0,
            self.timeouts,
            self.average_messages()
        );
    }

    /// Prints the final statistics including totals and rates
    pub fn print_final_stats(&self) {
        let duration = self.start_time.elapsed();
        let rounds_per_sec = self.total_rounds as f64 / duration.as_secs_f64().max(f64::EPSILON);

        println!("SIMULATOR: === Final Statistics ===");
        println!("SIMULATOR: Duration: {:.2}s", duration.as_secs_f64());
        println!("SIMULATOR: Total Rounds: {}", self.total_rounds);
        println!("SIMULATOR: Successful Rounds: {}", self.successes);
        println!("SIMULATOR: Success Rate: {:.2}%", self.success_rate() * 100.0);
        println!("SIMULATOR: Timed Out Rounds: {}", self.timeouts);
        for (phase, count) in &self.failures_by_phase {
            println!("SIMULATOR: Failed at {}: {}", phase, count);
        }
        println!("SIMULATOR: Average Messages per Round: {:.1}", self.average_messages());
        println!("SIMULATOR: Rounds per Second: {:.1}", rounds_per_sec);
    }

    fn average_messages(&self) -> f64 {
        if self.total_rounds == 0 {
            0.0
        } else {
            self.total_messages as f64 / self.total_rounds as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_sim::consensus::Membership;
    use pbft_sim::types::Phase;

    fn result(status: RoundStatus, failed_phase: Option<Phase>, reason: &str, messages: usize) -> RoundResult {
        RoundResult {
            round: 1,
            status,
            reason: reason.to_string(),
            failed_phase,
            membership: Membership::default(),
            message_count: messages,
            wait_ms: 0,
        }
    }

    #[test]
    fn test_record_round() {
        let mut stats = SimulatorStats::new();
        stats.record_round(&result(RoundStatus::Success, None, "committed", 24));
        stats.record_round(&result(RoundStatus::Failure, Some(Phase::Prepare), "prepare: quorum not reached", 10));
        stats.record_round(&result(RoundStatus::Failure, Some(Phase::Prepare), "prepare: quorum not reached", 8));
        stats.record_round(&result(RoundStatus::TimeoutFailure, None, "finalize wait elapsed", 0));

        assert_eq!(stats.total_rounds(), 4);
        assert_eq!(stats.successes(), 1);
        assert!((stats.success_rate() - 0.25).abs() < 1e-12);
        assert_eq!(stats.failures_by_phase().get("prepare"), Some(&2));
        assert!((stats.average_messages() - 10.5).abs() < 1e-12);
    }

    /// Failures are grouped by the recorded phase, whatever the reason text says
    #[test]
    fn test_failures_grouped_by_recorded_phase() {
        let mut stats = SimulatorStats::new();
        stats.record_round(&result(
            RoundStatus::Failure,
            Some(Phase::Commit),
            "abandoned: round 3 started before round 2 was terminal",
            12,
        ));
        stats.record_round(&result(RoundStatus::Failure, Some(Phase::PrePrepare), "pre-prepare: 1 of 4", 3));
        stats.record_round(&result(RoundStatus::Failure, None, "no outcome", 0));

        assert_eq!(stats.failures_by_phase().get("commit"), Some(&1));
        assert_eq!(stats.failures_by_phase().get("pre-prepare"), Some(&1));
        assert_eq!(stats.failures_by_phase().get("unknown"), Some(&1));
        assert_eq!(stats.failures_by_phase().get("abandoned"), None);
    }
}
