//! Query execution integration tests.
//!
//! Runs the execution engine against real backends through the registry.

use db_switchboard::classify::{ClassifierKind, StatementKind};
use db_switchboard::connection::{ActivationPolicy, ConnectionRegistry, TenantConnection};
use db_switchboard::dialect::Dialect;
use db_switchboard::error::GatewayError;
use db_switchboard::query::ExecutionEngine;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

async fn sqlite_connection(registry: &ConnectionRegistry) -> TenantConnection {
    registry
        .connect("alice", Dialect::Sqlite, Some("scratch"), "sqlite::memory:")
        .await
        .unwrap()
}

fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

#[tokio::test]
async fn test_two_rows_three_columns() {
    let registry = ConnectionRegistry::new(ActivationPolicy::LastActiveWins);
    let connection = sqlite_connection(&registry).await;
    let engine = ExecutionEngine::default();
    let token = CancellationToken::new();

    engine
        .execute(
            &connection,
            "CREATE TABLE people (id INTEGER, name TEXT, score REAL); \
             INSERT INTO people VALUES (1, 'ada', 9.5), (2, 'bob', NULL)",
            &token,
        )
        .await
        .unwrap();

    let table = engine
        .execute(&connection, "SELECT id, name, score FROM people ORDER BY id", &token)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(table.columns, strings(&["id", "name", "score"]));
    assert_eq!(table.row_count(), 2);
    assert!(table.rows.iter().all(|row| row.len() == 3));
    assert_eq!(table.rows[0], strings(&["1", "ada", "9.5"]));
    assert_eq!(table.rows[1], strings(&["2", "bob", "NULL"]));

    let with_header = table.with_header_row();
    assert_eq!(with_header.len(), 3);
    assert_eq!(with_header[0], strings(&["id", "name", "score"]));
}

#[tokio::test]
async fn test_empty_table_is_zero_rows() {
    let registry = ConnectionRegistry::default();
    let connection = sqlite_connection(&registry).await;
    let engine = ExecutionEngine::default();
    let token = CancellationToken::new();

    engine
        .execute(&connection, "CREATE TABLE empty (a INTEGER, b TEXT)", &token)
        .await
        .unwrap();
    let table = engine
        .execute(&connection, "SELECT a, b FROM empty", &token)
        .await
        .unwrap()
        .expect("reading statement returns a table");

    assert!(table.is_empty());
    assert_eq!(table.columns, strings(&["a", "b"]));
}

#[tokio::test]
async fn test_lowercase_update_column_is_reading() {
    let engine = ExecutionEngine::default();
    assert_eq!(
        engine.classify("select updated_at from t"),
        StatementKind::Reading
    );
    assert_eq!(
        engine.classify("INSERT INTO t VALUES (1)"),
        StatementKind::Mutating
    );

    let registry = ConnectionRegistry::default();
    let connection = sqlite_connection(&registry).await;
    let token = CancellationToken::new();
    engine
        .execute(&connection, "CREATE TABLE t (updated_at TEXT)", &token)
        .await
        .unwrap();
    let table = engine
        .execute(&connection, "select updated_at from t", &token)
        .await
        .unwrap();
    assert!(table.is_some());
}

#[tokio::test]
async fn test_returning_clause_depends_on_classifier() {
    let registry = ConnectionRegistry::default();
    let connection = sqlite_connection(&registry).await;
    let token = CancellationToken::new();
    let substring = ExecutionEngine::default();
    let parser = ExecutionEngine::new(ClassifierKind::Parser.build());

    substring
        .execute(&connection, "CREATE TABLE ids (id INTEGER PRIMARY KEY)", &token)
        .await
        .unwrap();

    let sql = "INSERT INTO ids (id) VALUES (7) RETURNING id";
    assert!(substring.execute(&connection, sql, &token).await.unwrap().is_none());

    let sql = "INSERT INTO ids (id) VALUES (8) RETURNING id";
    let table = parser.execute(&connection, sql, &token).await.unwrap().unwrap();
    assert_eq!(table.rows, vec![strings(&["8"])]);
}

#[tokio::test]
async fn test_failure_keeps_connection_active() {
    let registry = ConnectionRegistry::default();
    let connection = sqlite_connection(&registry).await;
    let engine = ExecutionEngine::default();

    let err = engine
        .execute(&connection, "SELEC nonsense", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Prepare(_)));

    let active = registry.resolve_active("alice").await.unwrap();
    assert!(active.handle.same_client(&connection.handle));
}

#[tokio::test]
async fn test_list_tables_sqlite() {
    let registry = ConnectionRegistry::default();
    let connection = sqlite_connection(&registry).await;
    let engine = ExecutionEngine::default();
    let token = CancellationToken::new();

    for ddl in ["CREATE TABLE b (x INTEGER)", "CREATE TABLE a (y INTEGER)"] {
        engine.execute(&connection, ddl, &token).await.unwrap();
    }
    assert_eq!(
        engine.list_tables(&connection, &token).await.unwrap(),
        strings(&["a", "b"])
    );
}

#[tokio::test]
async fn test_postgres_round_trip() {
    let Some(url) = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()) else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let registry = ConnectionRegistry::default();
    let connection = registry
        .connect("alice", Dialect::Postgres, Some("pg"), &url)
        .await
        .unwrap();
    let engine = ExecutionEngine::default();
    let token = CancellationToken::new();

    engine
        .execute(
            &connection,
            "CREATE TEMP TABLE switchboard_people (id INT, name TEXT, blob BYTEA); \
             INSERT INTO switchboard_people VALUES (1, 'ada', 'raw'::bytea), (2, NULL, NULL)",
            &token,
        )
        .await
        .unwrap();

    let table = engine
        .execute(
            &connection,
            "SELECT id, name, blob FROM switchboard_people ORDER BY id",
            &token,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(table.rows[0], strings(&["1", "ada", "raw"]));
    assert_eq!(table.rows[1], strings(&["2", "NULL", "NULL"]));

    let tables = engine.list_tables(&connection, &token).await.unwrap();
    assert!(!tables.contains(&"pg_class".to_string()));

    registry.release("alice").await;
}
