//! # Observability
//!
//! Logging setup for the conveyor binaries.
//!
//! Library crates only emit events through `tracing`; a binary calls
//! [`init`] or [`init_with_config`] once at startup to decide where they go:
//!
//! - stderr, either compact text or one JSON object per line;
//! - optionally a JSONL file (`~/.conveyor/logs/conveyor.jsonl` by default)
//!   that several processes can append to and that can be followed with
//!   `tail -f ... | jq`.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "conveyor".into(),
//!     default_level: "debug".into(),
//!     log_path: observability::default_log_path(),
//!     ..Default::default()
//! })?;
//! tracing::info!("ready");
//! ```

mod json_layer;
mod writer;

use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::LogFileWriter;

/// Format of the stderr output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected compact or json)")),
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL line.
    pub service_name: String,

    /// Default level filter (e.g. "debug", "info,fallback_output=trace").
    /// Overridden by `RUST_LOG` when set.
    pub default_level: String,

    /// Also append structured JSONL to this file.
    pub log_path: Option<PathBuf>,

    /// Emit logs to stderr.
    pub also_stderr: bool,

    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "conveyor".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
            format: LogFormat::Compact,
        }
    }
}

/// `~/.conveyor/logs/conveyor.jsonl`, if a home directory is known.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".conveyor").join("logs").join("conveyor.jsonl"))
}

/// Initialize logging with default settings and the given service name.
pub fn init(service_name: &str) -> io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Install the global subscriber.
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let file_layer = match &config.log_path {
        Some(path) => {
            let writer = LogFileWriter::open(path)?;
            Some(JsonLayer::new(config.service_name.clone(), writer).with_filter(env_filter(&config)))
        }
        None => None,
    };

    let stderr_layer = config.also_stderr.then(|| {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(io::stderr);
        match config.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Json => layer.json().boxed(),
        }
        .with_filter(env_filter(&config))
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(io::Error::other)?;

    if let Some(path) = &config.log_path {
        tracing::info!(log_path = %path.display(), "observability initialized");
    }
    Ok(())
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
}

pub use tracing::{debug, error, info, instrument, trace, warn};
