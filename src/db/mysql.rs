//! MySQL database client implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column as _, Executor as _, Row as _, Statement as _, TypeInfo as _, ValueRef as _};
use tracing::debug;

use crate::db::{connect_with_retry, ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::dialect::Dialect;
use crate::error::{GatewayError, Result};

/// MySQL database client.
#[derive(Debug)]
pub struct MySqlClient {
    pool: MySqlPool,
}

impl MySqlClient {
    /// Opens a client from a `mysql://` connection string.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let pool = connect_with_retry(|| pool_options().connect(connection_string))
        .await
        .map_err(map_connection_error)?;

        debug!("Successfully connected to MySQL");
        Ok(Self { pool })
    }
}

/// One connection that is never recycled, so session state such as temporary
/// tables and `SET` variables lives as long as the handle.
fn pool_options() -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .acquire_timeout(Duration::from_secs(10))
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
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

        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect();

        let mysql_rows = statement
            .query()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| GatewayError::execute(format_query_error(e)))?;

        let rows = mysql_rows
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

fn convert_row(row: &MySqlRow) -> Result<Row> {
    (0..row.len()).map(|i| convert_value(row, i)).collect()
}

fn convert_value(row: &MySqlRow, index: usize) -> Result<Value> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| GatewayError::scan(format!("column {index}: {e}")))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_uppercase();

    let decoded = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(index).map(Value::Bool),
        "TINYINT" => row.try_get::<i8, _>(index).map(|v| Value::Int(v as i64)),
        "SMALLINT" => row.try_get::<i16, _>(index).map(|v| Value::Int(v as i64)),
        "INT" | "MEDIUMINT" => row.try_get::<i32, _>(index).map(|v| Value::Int(v as i64)),
        "BIGINT" => row.try_get::<i64, _>(index).map(Value::Int),
        "TINYINT UNSIGNED" => row.try_get::<u8, _>(index).map(|v| Value::Int(v as i64)),
        "SMALLINT UNSIGNED" | "YEAR" => row.try_get::<u16, _>(index).map(|v| Value::Int(v as i64)),
        "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => {
            row.try_get::<u32, _>(index).map(|v| Value::Int(v as i64))
        }
        // Values past i64::MAX keep their exact digits as text.
        "BIGINT UNSIGNED" => row.try_get::<u64, _>(index).map(|v| match i64::try_from(v) {
            Ok(signed) => Value::Int(signed),
            Err(_) => Value::String(v.to_string()),
        }),
        "FLOAT" => row.try_get::<f32, _>(index).map(|v| Value::Float(v as f64)),
        "DOUBLE" => row.try_get::<f64, _>(index).map(Value::Float),
        "DECIMAL" => row
            .try_get::<BigDecimal, _>(index)
            .map(|v| Value::String(v.to_string())),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .map(|v| Value::String(v.to_string())),
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(index)
            .map(|v| Value::String(v.to_string())),
        "DATETIME" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(|v| Value::String(v.to_rfc3339())),
        "JSON" => row
            .try_get::<serde_json::Value, _>(index)
            .map(|v| Value::String(v.to_string())),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            row.try_get::<Vec<u8>, _>(index).map(Value::Bytes)
        }
        // Some server versions report catalog names (SHOW TABLES) as binary.
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .or_else(|_| row.try_get::<Vec<u8>, _>(index).map(Value::Bytes)),
    };

    decoded.map_err(|e| GatewayError::scan(format!("column {index} ({type_name}): {e}")))
}

fn map_connection_error(error: sqlx::Error) -> GatewayError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("access denied") {
        GatewayError::connection(format!(
            "Authentication failed. Check your credentials. ({error})"
        ))
    } else if error_str.contains("unknown database") {
        GatewayError::connection(format!("Database does not exist. ({error})"))
    } else {
        GatewayError::connection(format!("failed to open mysql connection: {error}"))
    }
}

fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => match db_error.code() {
            Some(code) => format!("ERROR {code}: {}", db_error.message()),
            None => format!("ERROR: {}", db_error.message()),
        },
        None => error.to_string(),
    }
}
