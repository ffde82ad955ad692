//! Connection bookkeeping.
//!
//! Every successful connect is recorded with a redacted connection string so
//! that recently used databases can be offered again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use super::{format_timestamp, parse_dialect, parse_timestamp};
use crate::dialect::Dialect;
use crate::error::{GatewayError, Result};

/// A connection a user opened at some point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub user: String,
    pub dialect: Dialect,
    pub database_label: String,
    /// Connection string with any password masked.
    pub connection_string: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct ConnectionRecordRow {
    login: String,
    dialect: String,
    database_label: String,
    connection_string: String,
    created_at: String,
}

impl TryFrom<ConnectionRecordRow> for ConnectionRecord {
    type Error = GatewayError;

    fn try_from(row: ConnectionRecordRow) -> Result<Self> {
        Ok(Self {
            user: row.login,
            dialect: parse_dialect(&row.dialect)?,
            database_label: row.database_label,
            connection_string: row.connection_string,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

/// Records a connection.
pub async fn save_connection_record(pool: &SqlitePool, record: &ConnectionRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO connection_records
        (login, dialect, database_label, connection_string, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.user)
    .bind(record.dialect.driver())
    .bind(&record.database_label)
    .bind(&record.connection_string)
    .bind(format_timestamp(&record.created_at))
    .execute(pool)
    .await
    .map_err(|e| GatewayError::persistence(format!("Failed to save connection record: {e}")))?;

    Ok(())
}

/// Lists a user's connections made at or after `since`, newest first.
pub async fn fetch_recent_connections(
    pool: &SqlitePool,
    user: &str,
    since: DateTime<Utc>,
) -> Result<Vec<ConnectionRecord>> {
    let rows: Vec<ConnectionRecordRow> = sqlx::query_as(
        r#"
        SELECT login, dialect, database_label, connection_string, created_at
        FROM connection_records
        WHERE login = ? AND created_at >= ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user)
    .bind(format_timestamp(&since))
    .fetch_all(pool)
    .await
    .map_err(|e| GatewayError::persistence(format!("Failed to list recent connections: {e}")))?;

    rows.into_iter().map(ConnectionRecord::try_from).collect()
}
