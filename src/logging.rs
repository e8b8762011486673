//! Structured logging: console plus a daily rolling file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{LedgerError, Result};

pub const LOG_FILE_PREFIX: &str = "station-ledger";
const DEFAULT_FILTER: &str = "info,station_ledger=debug";
const MAX_LOG_FILES: usize = 14;

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Keep the returned guard alive for as long as the process runs; dropping
/// it flushes and closes the file writer.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fs::create_dir_all(log_dir).map_err(|e| LedgerError::Storage(e.to_string()))?;
    prune_old_logs(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LedgerError::Storage(format!("logging already initialised: {e}")))?;

    Ok(guard)
}

/// Keep only the newest [`MAX_LOG_FILES`] log files.
pub fn prune_old_logs(log_dir: &Path) {
    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if path.is_file() && is_log {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::UNIX_EPOCH);
            log_files.push((path, modified));
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}
