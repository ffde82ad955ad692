//! SQLite database client implementation.
//!
//! Accepts either a `sqlite:` URL (including `sqlite::memory:`) or a plain
//! filesystem path to an existing database file, such as a materialized upload.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Executor as _, Row as _, Statement as _, TypeInfo as _, ValueRef as _};
use tracing::debug;

use crate::db::{connect_with_retry, ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::dialect::Dialect;
use crate::error::{GatewayError, Result};

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
}

impl SqliteClient {
    /// Opens a client from a `sqlite:` URL or a path to an existing file.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let options = parse_options(connection_string)?;

        // The single connection must outlive idle periods, otherwise an
        // in-memory database would vanish between statements.
        let pool = connect_with_retry(|| {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options.clone())
        })
        .await
        .map_err(|e| GatewayError::connection(format!("failed to open sqlite database: {e}")))?;

        debug!("Successfully opened SQLite database");
        Ok(Self { pool })
    }
}

fn parse_options(connection_string: &str) -> Result<SqliteConnectOptions> {
    let options = if connection_string.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(connection_string)
            .map_err(|e| GatewayError::connection(format!("invalid sqlite url: {e}")))?
    } else {
        SqliteConnectOptions::new()
            .filename(connection_string)
            .create_if_missing(false)
    };
    Ok(options.busy_timeout(Duration::from_secs(5)))
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| GatewayError::execute(format!("failed to acquire connection: {e}")))?;

        let result = (&mut *conn)
            .execute(sql)
            .await
            .map_err(|e| GatewayError::execute(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn fetch_all(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| GatewayError::execute(format!("failed to acquire connection: {e}")))?;

        let statement = (&mut *conn)
            .prepare(sql)
            .await
            .map_err(|e| GatewayError::prepare(e.to_string()))?;

        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect();

        let sqlite_rows = statement
            .query()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| GatewayError::execute(e.to_string()))?;

        let rows = sqlite_rows
            .iter()
            .map(convert_row)
            .collect::<Result<Vec<Row>>>()?;

        Ok(QueryResult::with_data(columns, rows).with_execution_time(start.elapsed()))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn convert_row(row: &SqliteRow) -> Result<Row> {
    (0..row.len()).map(|i| convert_value(row, i)).collect()
}

/// Decodes one cell by its storage class, which SQLite tracks per value.
fn convert_value(row: &SqliteRow, index: usize) -> Result<Value> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| GatewayError::scan(format!("column {index}: {e}")))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_uppercase();

    let decoded = match type_name.as_str() {
        "INTEGER" => row.try_get::<i64, _>(index).map(Value::Int),
        "REAL" => row.try_get::<f64, _>(index).map(Value::Float),
        "BLOB" => row.try_get::<Vec<u8>, _>(index).map(Value::Bytes),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .or_else(|_| row.try_get::<Vec<u8>, _>(index).map(Value::Bytes)),
    };

    decoded.map_err(|e| GatewayError::scan(format!("column {index} ({type_name}): {e}")))
}
