//! Backend connection tests.
//!
//! Tests database connectivity and error handling for each dialect.

use db_switchboard::db::{self, DatabaseClient, MySqlClient, PostgresClient};
use db_switchboard::dialect::Dialect;
use db_switchboard::error::GatewayError;

fn env_url(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[tokio::test]
async fn test_postgres_connect_and_read() {
    let Some(url) = env_url("DATABASE_URL") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let client = PostgresClient::connect(&url).await.unwrap();
    let result = client.fetch_all("SELECT 1 AS one, 'x' AS two").await.unwrap();
    assert_eq!(result.columns.len(), 2);
    assert_eq!(result.row_count(), 1);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_mysql_connect_and_read() {
    let Some(url) = env_url("MYSQL_DATABASE_URL") else {
        eprintln!("Skipping test: MYSQL_DATABASE_URL not set");
        return;
    };

    let client = MySqlClient::connect(&url).await.unwrap();
    let result = client.fetch_all("SELECT 1 AS one").await.unwrap();
    assert_eq!(result.row_count(), 1);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_open_dispatches_on_dialect() {
    let client = db::open(Dialect::Sqlite, "sqlite::memory:").await.unwrap();
    assert_eq!(client.dialect(), Dialect::Sqlite);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_open_missing_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.db");

    let err = db::open(Dialect::Sqlite, &path.to_string_lossy())
        .await
        .err()
        .expect("missing file should not be created");
    assert!(matches!(err, GatewayError::Connection(_)));
    assert!(!path.exists());
}
