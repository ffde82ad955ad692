//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as _, Executor as _, Row as _, Statement as _, TypeInfo as _, ValueRef as _};
use tracing::debug;

use crate::db::{connect_with_retry, ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::dialect::Dialect;
use crate::error::{GatewayError, Result};

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Opens a client from a `postgres://` connection string.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let pool = connect_with_retry(|| pool_options().connect(connection_string))
        .await
        .map_err(map_connection_error)?;

        debug!("Successfully connected to PostgreSQL");
        Ok(Self { pool })
    }
}

/// One connection that is never recycled, so session state such as temporary
/// tables and `SET` variables lives as long as the handle.
fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .acquire_timeout(Duration::from_secs(10))
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
            .map_err(|e| GatewayError::execute(format_query_error(e)))?;

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
            .map_err(|e| GatewayError::prepare(format_query_error(e)))?;

        // Column metadata comes from the prepared statement so that empty
        // results still carry their header.
        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect();

        let pg_rows = statement
            .query()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| GatewayError::execute(format_query_error(e)))?;

        let rows = pg_rows
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

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Result<Row> {
    (0..row.len()).map(|i| convert_value(row, i)).collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize) -> Result<Value> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| GatewayError::scan(format!("column {index}: {e}")))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_uppercase();

    let decoded = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(index).map(Value::Bool),
        "INT2" => row.try_get::<i16, _>(index).map(|v| Value::Int(v as i64)),
        "INT4" => row.try_get::<i32, _>(index).map(|v| Value::Int(v as i64)),
        "INT8" => row.try_get::<i64, _>(index).map(Value::Int),
        "OID" => row
            .try_get::<sqlx::postgres::types::Oid, _>(index)
            .map(|v| Value::Int(v.0 as i64)),
        "FLOAT4" => row.try_get::<f32, _>(index).map(|v| Value::Float(v as f64)),
        "FLOAT8" => row.try_get::<f64, _>(index).map(Value::Float),
        "NUMERIC" => row
            .try_get::<BigDecimal, _>(index)
            .map(|v| Value::String(v.to_string())),
        "BYTEA" => row.try_get::<Vec<u8>, _>(index).map(Value::Bytes),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .map(|v| Value::String(v.to_string())),
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(index)
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(|v| Value::String(v.to_rfc3339())),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(index)
            .map(|v| Value::String(v.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<serde_json::Value, _>(index)
            .map(|v| Value::String(v.to_string())),
        // Text-like and unknown types
        _ => row.try_get::<String, _>(index).map(Value::String),
    };

    decoded.map_err(|e| GatewayError::scan(format!("column {index} ({type_name}): {e}")))
}

/// Maps sqlx connection errors to user-facing messages.
fn map_connection_error(error: sqlx::Error) -> GatewayError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed") {
        GatewayError::connection(format!(
            "Authentication failed. Check your credentials. ({error})"
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        GatewayError::connection(format!("Database does not exist. ({error})"))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        GatewayError::connection(format!(
            "Server requires SSL. Add '?sslmode=require' to connection string. ({error})"
        ))
    } else {
        GatewayError::connection(format!("failed to open postgres connection: {error}"))
    }
}

/// Formats a query error with PostgreSQL detail and hint if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
