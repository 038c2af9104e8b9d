use once_cell::sync::OnceCell;
use std::env;
use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::Level;

static ENABLE_LOGGING: AtomicBool = AtomicBool::new(false);
static SUBSCRIBER: OnceCell<()> = OnceCell::new();

const LOG_FILE: &str = "pbft-sim.log";

/// Initializes logging based on environment variables:
/// - PBFT_LOGGING: `true` installs a tracing subscriber, `false` or unset keeps everything quiet
/// - PBFT_LOG_LEVEL: maximum level, `info` by default
/// - PBFT_LOG_TO_FILE: `true` appends to a file instead of stdout
/// - PBFT_LOG_FILE: path of that file, `pbft-sim.log` by default
///
/// To enable logging in tests, run: PBFT_LOGGING=true cargo test -- --nocapture
pub fn init_logging() {
    let enabled = match env::var("PBFT_LOGGING") {
        Ok(value) => match value.as_str() {
            "true" => true,
            "false" => false,
            other => {
                eprintln!("PBFT_LOGGING must be 'true' or 'false', got '{}'; logging stays off", other);
                false
            }
        },
        Err(_) => false,
    };
    ENABLE_LOGGING.store(enabled, Ordering::SeqCst);
    if enabled {
        SUBSCRIBER.get_or_init(install_subscriber);
    }
}

fn install_subscriber() {
    let level = env::var("PBFT_LOG_LEVEL")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt().with_max_level(level).with_target(false);

    let to_file = env::var("PBFT_LOG_TO_FILE").map(|v| v == "true").unwrap_or(false);
    let result = if to_file {
        let path = env::var("PBFT_LOG_FILE").unwrap_or_else(|_| LOG_FILE.to_string());
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).try_init(),
            Err(e) => {
                eprintln!("Failed to open {}: {}; logging to stdout", path, e);
                builder.try_init()
            }
        }
    } else {
        builder.try_init()
    };
    // another subscriber may already be installed, e.g. by a test harness
    if let Err(e) = result {
        eprintln!("Tracing subscriber not installed: {}", e);
    }
}

pub fn is_enabled() -> bool {
    ENABLE_LOGGING.load(Ordering::SeqCst)
}

/// Prefixed log line, emitted only when logging is enabled
pub fn log(prefix: &str, message: &str) {
    if is_enabled() {
        tracing::info!("[{}]   {}", prefix, message);
    }
}
