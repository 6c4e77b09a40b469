//! Conveyor - runs stream pipelines from JSON config files.

mod app;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use observability::{LogConfig, LogFormat};

/// Conveyor command-line interface.
#[derive(Parser)]
#[command(name = "conveyor")]
#[command(about = "Move messages from an input through a buffer to ordered fallback outputs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "CONVEYOR_LOG_LEVEL", global = true)]
    log_level: String,

    /// stderr log format (compact, json)
    #[arg(long, default_value = "compact", env = "CONVEYOR_LOG_FORMAT", global = true)]
    log_format: LogFormat,

    /// Also append JSONL logs to this file
    #[arg(long, env = "CONVEYOR_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Append JSONL logs to ~/.conveyor/logs/conveyor.jsonl
    #[arg(long, global = true, conflicts_with = "log_file")]
    log_to_default_file: bool,

    /// Seconds to wait for in-flight messages when stopping
    #[arg(long, default_value_t = 20, env = "CONVEYOR_SHUTDOWN_TIMEOUT", global = true)]
    shutdown_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single stream; reads stdin unless the config names an input
    Run {
        /// Stream config file
        #[arg(short, long, env = "CONVEYOR_CONFIG")]
        config: PathBuf,
    },
    /// Run every stream config found under a directory
    Streams {
        /// Directory of `.json` stream configs
        #[arg(short, long, env = "CONVEYOR_STREAMS_DIR")]
        dir: PathBuf,

        /// Log per-stream metrics at this interval (0 disables)
        #[arg(long, default_value_t = 0)]
        status_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_path = match (&cli.log_file, cli.log_to_default_file) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => observability::default_log_path(),
        (None, false) => None,
    };
    observability::init_with_config(LogConfig {
        service_name: "conveyor".into(),
        default_level: cli.log_level.clone(),
        log_path,
        also_stderr: true,
        format: cli.log_format,
    })?;

    let shutdown_timeout = Duration::from_secs(cli.shutdown_timeout_secs);

    match cli.command {
        Commands::Run { config } => app::run_stream(&config, shutdown_timeout).await,
        Commands::Streams {
            dir,
            status_interval_secs,
        } => {
            let interval = (status_interval_secs > 0).then(|| Duration::from_secs(status_interval_secs));
            app::run_streams(&dir, interval, shutdown_timeout).await
        }
    }
}
