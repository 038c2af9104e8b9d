use std::time::Duration;

/// Node that proposes when the configuration does not name one
pub const DEFAULT_PROPOSER: usize = 0;

/// Round timeout used when the configuration does not set one
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(40);

/// Delay before a simulated node answers during an interactive round
pub const DEFAULT_ROBOT_DELAY: Duration = Duration::from_secs(10);

/// How long the orchestrator waits for a round's finalize marker
pub const DEFAULT_FINALIZE_WAIT: Duration = Duration::from_secs(5);

/// Buffer size of a push-notification subscription
pub const EVENT_BUFFER_SIZE: usize = 1024;

/// Largest session the exact combinatorial engine will enumerate
pub const EXACT_MAX_NODES: usize = 10;

/// Enumerated worlds whose probability weight falls below this floor are skipped.
/// The total mass skipped is bounded by the number of worlds times the floor,
/// far below the 1e-6 agreement the engines are checked against.
pub const PRUNE_FLOOR: f64 = 1e-15;
