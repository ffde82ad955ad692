//! Logging setup.
//!
//! Logs go to stderr by default, or to a file when the binary is given
//! `--log-file`. `RUST_LOG` overrides the default `info` filter.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

use crate::error::{GatewayError, Result};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to a file, truncating it on each run.
pub fn init_file_logging(log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            GatewayError::config(format!("Could not create log directory: {e}"))
        })?;
    }

    let log_file = File::create(log_path)
        .map_err(|e| GatewayError::config(format!("Could not create log file: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .init();
    Ok(())
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Returns the default log file location.
///
/// Uses the XDG state directory on Linux (`~/.local/state/db-switchboard/switchboard.log`),
/// falling back to the config directory and then the temp directory.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("db-switchboard").join("switchboard.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("db-switchboard").join("switchboard.log");
    }

    std::env::temp_dir().join("switchboard.log")
}
