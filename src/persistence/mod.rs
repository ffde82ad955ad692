//! Persistence layer for the gateway.
//!
//! Credentials, connection records and query history live in a local SQLite
//! state database. The gateway only talks to it through [`GatewayStore`].

pub mod connections;
pub mod history;
mod migrations;
pub mod users;

pub use connections::ConnectionRecord;
pub use history::{HistoryFilter, QueryRecord};

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{info, warn};

use crate::dialect::Dialect;
use crate::error::{GatewayError, Result};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

/// The durable store behind the gateway.
#[async_trait]
pub trait GatewayStore: Send + Sync {
    /// Registers a user. Fails with `AuthError::AlreadyExists` for a taken login.
    async fn save_credentials(&self, user: &str, password: &str) -> Result<()>;

    /// Fails with `AuthError::InvalidCredentials` unless the pair matches.
    async fn check_credentials(&self, user: &str, password: &str) -> Result<()>;

    async fn save_connection_record(&self, record: &ConnectionRecord) -> Result<()>;

    async fn save_history_record(&self, record: &QueryRecord) -> Result<()>;

    /// Returns the user's history for one database label, oldest first.
    async fn fetch_history_records(
        &self,
        user: &str,
        database_label: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<QueryRecord>>;

    /// Returns the user's connection records made at or after `since`, newest first.
    async fn fetch_recent_connections(
        &self,
        user: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConnectionRecord>>;
}

/// SQLite-backed state database.
#[derive(Debug, Clone)]
pub struct StateDb {
    pool: SqlitePool,
    db_path: Option<PathBuf>,
}

impl StateDb {
    /// Opens or creates the state database at the specified path.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::ensure_parent_dirs(path)?;

        let mut last_error = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt)))
                    .await;
            }

            match Self::connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("State database opened at {}", path.display());
                    return Ok(Self {
                        pool,
                        db_path: Some(path.to_path_buf()),
                    });
                }
                Err(e) => {
                    warn!("Failed to open state database (attempt {}): {e}", attempt + 1);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GatewayError::persistence("Failed to open database after retries")
        }))
    }

    /// Opens a private in-memory state database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                GatewayError::persistence(format!("Failed to open in-memory state database: {e}"))
            })?;
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool, db_path: None })
    }

    /// Returns the default state database path for the current platform.
    ///
    /// - Linux: `~/.config/db-switchboard/state.db`
    /// - macOS: `~/Library/Application Support/db-switchboard/state.db`
    /// - Windows: `%APPDATA%\db-switchboard\state.db`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            GatewayError::persistence("Could not determine config directory")
        })?;
        Ok(config_dir.join("db-switchboard").join("state.db"))
    }

    async fn connect(path: &Path) -> Result<SqlitePool> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| GatewayError::persistence(format!("Invalid database path: {e}")))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                GatewayError::persistence(format!("Failed to connect to state database: {e}"))
            })
    }

    fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GatewayError::persistence(format!(
                    "Failed to create state directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Returns the path to the state database, if it lives on disk.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl GatewayStore for StateDb {
    async fn save_credentials(&self, user: &str, password: &str) -> Result<()> {
        users::save_credentials(&self.pool, user, password).await
    }

    async fn check_credentials(&self, user: &str, password: &str) -> Result<()> {
        users::check_credentials(&self.pool, user, password).await
    }

    async fn save_connection_record(&self, record: &ConnectionRecord) -> Result<()> {
        connections::save_connection_record(&self.pool, record).await
    }

    async fn save_history_record(&self, record: &QueryRecord) -> Result<()> {
        history::save_history_record(&self.pool, record).await
    }

    async fn fetch_history_records(
        &self,
        user: &str,
        database_label: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<QueryRecord>> {
        history::fetch_history_records(&self.pool, user, database_label, filter).await
    }

    async fn fetch_recent_connections(
        &self,
        user: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConnectionRecord>> {
        connections::fetch_recent_connections(&self.pool, user, since).await
    }
}

/// Timestamps are stored as fixed-width RFC 3339 UTC text so that they sort
/// and compare lexically.
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| GatewayError::persistence(format!("Invalid stored timestamp '{text}': {e}")))
}

pub(crate) fn parse_dialect(text: &str) -> Result<Dialect> {
    Dialect::parse(text)
        .map_err(|_| GatewayError::persistence(format!("Invalid stored dialect '{text}'")))
}
