//! Schema versioning and migrations for the state database.
//!
//! Manages database schema evolution with forward-only migrations.

use sqlx::sqlite::SqlitePool;
use tracing::info;

use crate::error::{GatewayError, Result};

const CURRENT_VERSION: i32 = 1;

/// Runs all pending migrations on the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    ensure_schema_versions_table(pool).await?;

    let current = get_current_version(pool).await?;

    if current > CURRENT_VERSION {
        return Err(GatewayError::persistence(format!(
            "Database schema version ({}) is newer than supported version ({}). \
             Please upgrade db-switchboard to the latest version.",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        info!(
            "Migrating state database from version {} to {}",
            current, CURRENT_VERSION
        );
        run_pending_migrations(pool, current).await?;
    }

    Ok(())
}

async fn ensure_schema_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        GatewayError::persistence(format!("Failed to create schema_versions table: {e}"))
    })?;

    Ok(())
}

async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_optional(pool)
        .await
        .map_err(|e| GatewayError::persistence(format!("Failed to get schema version: {e}")))?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

async fn run_pending_migrations(pool: &SqlitePool, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=CURRENT_VERSION {
        run_migration(pool, version).await?;
        record_version(pool, version).await?;
        info!("Applied migration v{}", version);
    }
    Ok(())
}

async fn record_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| GatewayError::persistence(format!("Failed to record migration: {e}")))?;
    Ok(())
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => migration_v1(pool).await,
        _ => Err(GatewayError::persistence(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: users, connection records and query history.
async fn migration_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            login TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| GatewayError::persistence(format!("Failed to create users table: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS connection_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            login TEXT NOT NULL,
            dialect TEXT NOT NULL CHECK (dialect IN ('postgres', 'mysql', 'sqlite')),
            database_label TEXT NOT NULL,
            connection_string TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        GatewayError::persistence(format!("Failed to create connection_records table: {e}"))
    })?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_connection_records_login
        ON connection_records(login, created_at)
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| GatewayError::persistence(format!("Failed to create connection index: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            login TEXT NOT NULL,
            dialect TEXT NOT NULL CHECK (dialect IN ('postgres', 'mysql', 'sqlite')),
            database_label TEXT NOT NULL,
            statement TEXT NOT NULL,
            executed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| GatewayError::persistence(format!("Failed to create query_history table: {e}")))?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_query_history_login_label
        ON query_history(login, database_label)
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| GatewayError::persistence(format!("Failed to create history index: {e}")))?;

    Ok(())
}
