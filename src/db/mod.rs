//! Database abstraction layer.
//!
//! Provides a trait-based interface over the backend drivers, so the
//! registry and execution engine never match on concrete client types.

mod mock;
mod mysql;
mod postgres;
mod sqlite;
mod types;

pub use mock::{FailingDatabaseClient, FailureStage, MockDatabaseClient, MockTracker};
pub use mysql::MySqlClient;
pub use postgres::PostgresClient;
pub use sqlite::SqliteClient;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::dialect::Dialect;
use crate::error::Result;

/// Maximum number of connection attempts when opening a backend.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Opens a backend connection for the given dialect.
///
/// This is the central factory function for backend handles.
pub async fn open(dialect: Dialect, connection_string: &str) -> Result<Box<dyn DatabaseClient>> {
    debug!(
        dialect = %dialect,
        target = %redact_connection_string(connection_string),
        "Opening backend connection"
    );
    match dialect {
        Dialect::Postgres => Ok(Box::new(PostgresClient::connect(connection_string).await?)),
        Dialect::MySql => Ok(Box::new(MySqlClient::connect(connection_string).await?)),
        Dialect::Sqlite => Ok(Box::new(SqliteClient::connect(connection_string).await?)),
    }
}

/// Trait defining the interface for backend clients.
///
/// A client owns exactly one live backend connection. Callers serialize use
/// of a client; implementations do not need to support concurrent statements.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Returns the dialect this client speaks.
    fn dialect(&self) -> Dialect;

    /// Executes a statement for its side effects and returns the affected row count.
    ///
    /// The text is sent unprepared, so scripts with several statements are accepted.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Prepares a row-producing statement, runs it and materializes every row.
    async fn fetch_all(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the backend connection.
    async fn close(&self) -> Result<()>;
}

/// Runs a connection attempt, retrying transient failures with exponential backoff.
pub(crate) async fn connect_with_retry<T, F, Fut>(
    mut attempt_fn: F,
) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
    let mut attempt = 1;

    loop {
        debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                warn!(
                    "Connection attempt {} failed (transient error), retrying in {:?}",
                    attempt, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();

    // Authentication and database-not-found errors are never transient
    if error_str.contains("authentication failed")
        || error_str.contains("access denied")
        || error_str.contains("does not exist")
        || error_str.contains("unknown database")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Returns the connection string with any password masked.
///
/// Covers the password in the userinfo and `password`/`pwd` query
/// parameters. Strings that are not URLs (plain SQLite paths) are returned
/// unchanged.
pub fn redact_connection_string(connection_string: &str) -> String {
    const MASK: &str = "******";

    let Ok(mut url) = Url::parse(connection_string) else {
        return connection_string.to_string();
    };
    let mut changed = false;

    if url.password().is_some() && url.set_password(Some(MASK)).is_ok() {
        changed = true;
    }

    if url.query_pairs().any(|(key, _)| is_password_key(key.as_ref())) {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| {
                let value = if is_password_key(key.as_ref()) {
                    MASK.to_string()
                } else {
                    value.into_owned()
                };
                (key.into_owned(), value)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        changed = true;
    }

    if changed {
        url.to_string()
    } else {
        connection_string.to_string()
    }
}

fn is_password_key(key: &str) -> bool {
    key.eq_ignore_ascii_case("password") || key.eq_ignore_ascii_case("pwd")
}
