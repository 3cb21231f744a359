use std::{env, fs, path::PathBuf};

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info,viewed=debug";
const LOG_FILE_PREFIX: &str = "viewed.log";

/// Installs the global subscriber: daily-rolling file plus stderr.
/// Keep the guard alive for the whole run or buffered lines are lost.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<WorkerGuard> {
    let log_dir = config.directory.clone().unwrap_or_else(default_log_dir);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let directive = filter_directive(env::var("RUST_LOG").ok(), config.filter.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_ansi(false),
        )
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

/// `RUST_LOG` wins over the config file, which wins over the built-in default.
fn filter_directive(from_env: Option<String>, from_config: Option<&str>) -> String {
    from_env
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            from_config
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("viewed").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}
