//! Log output setup for the logger binary.
//!
//! Console output goes to stderr at the requested level (`RUST_LOG`
//! overrides it); an optional log file receives the same events without
//! colour. Records from crates using the `log` facade are bridged in.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

static INSTALLED: parking_lot::Mutex<bool> = parking_lot::const_mutex(false);

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The level name is not one we know.
    #[error("unknown log level: {0}")]
    Level(String),
    /// The log file could not be opened.
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(String),
}

/// Parse a level name, case-insensitively.
///
/// Accepts `trace`, `debug`, `info`, `warn`/`warning`, `error`/`critical`
/// and `off`.
pub fn parse_level(level: &str) -> Result<LevelFilter, TelemetryError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "critical" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        _ => Err(TelemetryError::Level(level.to_string())),
    }
}

/// Install the global subscriber.
///
/// Only the first call installs anything; later calls return `Ok(())`.
pub fn init(level: LevelFilter, log_file: Option<&Path>) -> Result<(), TelemetryError> {
    let mut installed = INSTALLED.lock();
    if *installed {
        return Ok(());
    }

    let console_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let console = fmt::layer()
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_filter(console_filter);

    let file = match log_file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_writer(Mutex::new(open_log_file(path)?))
                .with_filter(level),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

    *installed = true;
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File, TelemetryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TelemetryError::LogFile {
            path: path.display().to_string(),
            source,
        })
}
