//! Configuration management for the gateway.
//!
//! Settings come from a TOML file, then environment variables, then CLI
//! flags. A missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::ClassifierKind;
use crate::connection::ActivationPolicy;
use crate::error::{GatewayError, Result};
use crate::persistence::StateDb;
use crate::uploads::LocalBlobStore;

/// Environment variable overriding the state database path.
pub const STATE_DB_ENV: &str = "SWITCHBOARD_STATE_DB";

/// Environment variable overriding the upload root.
pub const UPLOAD_DIR_ENV: &str = "SWITCHBOARD_UPLOAD_DIR";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Path of the SQLite state store. Defaults to the platform config dir.
    pub state_db: Option<PathBuf>,

    /// Root directory for tenant-scoped uploads. Defaults to the platform data dir.
    pub upload_dir: Option<PathBuf>,

    #[serde(default)]
    pub gateway: GatewaySettings,
}

/// Behavior knobs of the gateway facade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewaySettings {
    #[serde(default)]
    pub activation: ActivationPolicy,

    #[serde(default)]
    pub classifier: ClassifierKind,

    /// How far back `recent_connections` looks, in days.
    #[serde(default = "default_recent_connection_days")]
    pub recent_connection_days: u32,
}

fn default_recent_connection_days() -> u32 {
    10
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            activation: ActivationPolicy::default(),
            classifier: ClassifierKind::default(),
            recent_connection_days: default_recent_connection_days(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("db-switchboard")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            GatewayError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.gateway.recent_connection_days == 0 {
            return Err(GatewayError::config(
                "gateway.recent_connection_days must be at least 1",
            ));
        }
        Ok(())
    }

    /// Applies `SWITCHBOARD_*` environment variables on top of the file values.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(STATE_DB_ENV).filter(|v| !v.is_empty()) {
            self.state_db = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(UPLOAD_DIR_ENV).filter(|v| !v.is_empty()) {
            self.upload_dir = Some(PathBuf::from(path));
        }
    }

    /// Resolves the state database path, falling back to the platform default.
    pub fn state_db_path(&self) -> Result<PathBuf> {
        match &self.state_db {
            Some(path) => Ok(path.clone()),
            None => StateDb::default_path(),
        }
    }

    /// Resolves the upload root, falling back to the platform default.
    pub fn upload_root(&self) -> Result<PathBuf> {
        match &self.upload_dir {
            Some(path) => Ok(path.clone()),
            None => LocalBlobStore::default_root(),
        }
    }
}
