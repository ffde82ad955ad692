//! Integration tests for the persistence layer.

use chrono::{Duration, Utc};
use db_switchboard::dialect::Dialect;
use db_switchboard::error::{AuthError, GatewayError};
use db_switchboard::persistence::{
    ConnectionRecord, GatewayStore, HistoryFilter, QueryRecord, StateDb,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

async fn create_test_db() -> (StateDb, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test_state.db");
    let db = StateDb::open(&path).await.unwrap();
    (db, dir)
}

#[tokio::test]
async fn test_credentials_lifecycle() {
    let (db, _dir) = create_test_db().await;

    db.save_credentials("alice", "correct horse").await.unwrap();
    db.check_credentials("alice", "correct horse").await.unwrap();

    let wrong = db.check_credentials("alice", "battery staple").await;
    assert!(matches!(
        wrong,
        Err(GatewayError::Auth(AuthError::InvalidCredentials))
    ));

    let unknown = db.check_credentials("nobody", "x").await;
    assert!(matches!(
        unknown,
        Err(GatewayError::Auth(AuthError::InvalidCredentials))
    ));

    let duplicate = db.save_credentials("alice", "other").await;
    assert!(matches!(
        duplicate,
        Err(GatewayError::Auth(AuthError::AlreadyExists(ref login))) if login == "alice"
    ));
    db.close().await;
}

#[tokio::test]
async fn test_history_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.db");

    let db = StateDb::open(&path).await.unwrap();
    db.save_history_record(&QueryRecord {
        user: "alice".to_string(),
        dialect: Dialect::MySql,
        database_label: "shop".to_string(),
        statement: "DELETE FROM carts".to_string(),
        executed_at: Utc::now(),
    })
    .await
    .unwrap();
    db.close().await;

    let reopened = StateDb::open(&path).await.unwrap();
    let records = reopened
        .fetch_history_records("alice", "shop", &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].statement, "DELETE FROM carts");
    assert_eq!(records[0].dialect, Dialect::MySql);
    reopened.close().await;
}

#[tokio::test]
async fn test_recent_connections_through_trait_object() {
    let (db, _dir) = create_test_db().await;
    let store: &dyn GatewayStore = &db;
    let now = Utc::now();

    for (label, age_days) in [("stale", 40), ("last_week", 7), ("now", 0)] {
        store
            .save_connection_record(&ConnectionRecord {
                user: "alice".to_string(),
                dialect: Dialect::Postgres,
                database_label: label.to_string(),
                connection_string: "postgres://app:******@db/shop".to_string(),
                created_at: now - Duration::days(age_days),
            })
            .await
            .unwrap();
    }

    let recent = store
        .fetch_recent_connections("alice", now - Duration::days(10))
        .await
        .unwrap();
    let labels: Vec<&str> = recent.iter().map(|r| r.database_label.as_str()).collect();
    assert_eq!(labels, vec!["now", "last_week"]);
    db.close().await;
}

#[tokio::test]
async fn test_concurrent_history_writes() {
    let (db, _dir) = create_test_db().await;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            db.save_history_record(&QueryRecord {
                user: format!("user{}", i % 2),
                dialect: Dialect::Sqlite,
                database_label: "shared".to_string(),
                statement: format!("SELECT {i}"),
                executed_at: Utc::now(),
            })
            .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let user0 = db
        .fetch_history_records("user0", "shared", &HistoryFilter::default())
        .await
        .unwrap();
    let user1 = db
        .fetch_history_records("user1", "shared", &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(user0.len(), 10);
    assert_eq!(user1.len(), 10);
    assert!(user0.iter().all(|r| r.user == "user0"));
    db.close().await;
}
