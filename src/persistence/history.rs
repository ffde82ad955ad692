//! Query history persistence.
//!
//! Records are immutable once written; the gateway never updates or deletes
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use super::{format_timestamp, parse_dialect, parse_timestamp};
use crate::dialect::Dialect;
use crate::error::{GatewayError, Result};

/// One successfully executed (or explicitly saved) statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub user: String,
    pub dialect: Dialect,
    pub database_label: String,
    pub statement: String,
    pub executed_at: DateTime<Utc>,
}

/// Raw database row for a history record.
#[derive(Debug, Clone, FromRow)]
struct QueryRecordRow {
    login: String,
    dialect: String,
    database_label: String,
    statement: String,
    executed_at: String,
}

impl TryFrom<QueryRecordRow> for QueryRecord {
    type Error = GatewayError;

    fn try_from(row: QueryRecordRow) -> Result<Self> {
        Ok(Self {
            user: row.login,
            dialect: parse_dialect(&row.dialect)?,
            database_label: row.database_label,
            statement: row.statement,
            executed_at: parse_timestamp(&row.executed_at)?,
        })
    }
}

/// Optional narrowing of a history fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Only records made against this dialect.
    pub dialect: Option<Dialect>,
    /// Only the most recent `limit` records (still returned oldest first).
    pub limit: Option<i64>,
}

/// Records a statement in history.
pub async fn save_history_record(pool: &SqlitePool, record: &QueryRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO query_history
        (login, dialect, database_label, statement, executed_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.user)
    .bind(record.dialect.driver())
    .bind(&record.database_label)
    .bind(&record.statement)
    .bind(format_timestamp(&record.executed_at))
    .execute(pool)
    .await
    .map_err(|e| GatewayError::persistence(format!("Failed to record query: {e}")))?;

    Ok(())
}

/// Lists a user's history for one database label, oldest first.
pub async fn fetch_history_records(
    pool: &SqlitePool,
    user: &str,
    database_label: &str,
    filter: &HistoryFilter,
) -> Result<Vec<QueryRecord>> {
    let mut query = String::from(
        r#"
        SELECT login, dialect, database_label, statement, executed_at
        FROM query_history
        WHERE login = ? AND database_label = ?
        "#,
    );

    if filter.dialect.is_some() {
        query.push_str(" AND dialect = ?");
    }

    query.push_str(" ORDER BY executed_at DESC, id DESC");

    if filter.limit.is_some() {
        query.push_str(" LIMIT ?");
    }

    let mut sqlx_query = sqlx::query_as::<_, QueryRecordRow>(&query)
        .bind(user)
        .bind(database_label);

    if let Some(dialect) = filter.dialect {
        sqlx_query = sqlx_query.bind(dialect.driver());
    }
    if let Some(limit) = filter.limit {
        sqlx_query = sqlx_query.bind(limit);
    }

    let rows = sqlx_query
        .fetch_all(pool)
        .await
        .map_err(|e| GatewayError::persistence(format!("Failed to list history: {e}")))?;

    let mut records = rows
        .into_iter()
        .map(QueryRecord::try_from)
        .collect::<Result<Vec<_>>>()?;
    records.reverse();
    Ok(records)
}
