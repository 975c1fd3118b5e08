//! Logging bootstrap
//!
//! One log file per run, named by device identity and start time, plus
//! human-readable output on stdout. The file ends up in the log directory
//! that boot later stages into the upload tree, so every run's log
//! eventually reaches the server alongside the data.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialises tracing with stdout and per-run file output.
///
/// Returns the appender guard (must live for the whole run) and the log
/// file's name, which boot needs to exclude it from staging.
pub fn init(log_dir: &Path, device_label: &str) -> Result<(WorkerGuard, String)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let started = chrono::Utc::now().format("%Y%m%d_%H%M");
    let file_name = format!("ecopod_{device_label}_{started}.log");

    let appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok((guard, file_name))
}
