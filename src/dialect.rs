//! Per-backend knowledge: driver selection, table listing, value rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::db::Value;
use crate::error::{GatewayError, Result};

/// Text rendered for SQL NULL cells.
pub const NULL_TEXT: &str = "NULL";

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    Sqlite,
}

impl Dialect {
    /// All dialects, in a stable order.
    pub const ALL: [Dialect; 3] = [Dialect::Postgres, Dialect::MySql, Dialect::Sqlite];

    /// Parses a dialect name as submitted by the presentation layer.
    ///
    /// Matching is case-insensitive; anything else is `UnsupportedDialect`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(GatewayError::unsupported_dialect(format!(
                "'{other}' (expected postgres, mysql or sqlite)"
            ))),
        }
    }

    /// Returns the driver identifier used to open connections for this dialect.
    pub fn driver(&self) -> &'static str {
        resolve_driver(*self)
    }

    /// Returns the query listing the user tables of a database.
    pub fn table_listing_query(&self) -> &'static str {
        table_listing_query(*self)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver())
    }
}

impl std::str::FromStr for Dialect {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Returns the driver identifier for a dialect.
pub fn resolve_driver(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => "postgres",
        Dialect::MySql => "mysql",
        Dialect::Sqlite => "sqlite",
    }
}

/// Returns the dialect-specific query listing user tables.
///
/// Every query yields one text column holding the table name.
pub fn table_listing_query(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => {
            "SELECT tablename FROM pg_catalog.pg_tables \
             WHERE schemaname != 'pg_catalog' AND schemaname != 'information_schema' \
             ORDER BY tablename"
        }
        Dialect::MySql => "SHOW TABLES",
        Dialect::Sqlite => {
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name"
        }
    }
}

/// Resolves the table listing query from a dialect name.
pub fn table_listing_query_for(name: &str) -> Result<&'static str> {
    Dialect::parse(name).map(table_listing_query)
}

/// Renders a backend value as text.
///
/// Binary values are rendered as their raw (UTF-8, lossy) content and NULL as
/// [`NULL_TEXT`].
pub fn coerce_to_text(value: &Value) -> String {
    match value {
        Value::Null => NULL_TEXT.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
    }
}
