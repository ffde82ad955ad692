//! Registry behavior under concurrent use.

use std::sync::Arc;
use std::time::Duration;

use db_switchboard::connection::{ActivationPolicy, ConnectionRegistry};
use db_switchboard::db::{MockDatabaseClient, QueryResult};
use db_switchboard::dialect::Dialect;
use db_switchboard::error::GatewayError;
use db_switchboard::query::ExecutionEngine;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connect_racing_release_stays_consistent() {
    let registry = Arc::new(ConnectionRegistry::new(ActivationPolicy::LastActiveWins));

    let mut tasks = Vec::new();
    for i in 0..32 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            if i % 4 == 0 {
                registry.release("alice").await;
            } else {
                let label = format!("db{i}");
                registry
                    .register(
                        "alice",
                        Some(label.as_str()),
                        Box::new(MockDatabaseClient::new(Dialect::Sqlite)),
                    )
                    .await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let entries = registry.connections("alice").await;
    if entries.is_empty() {
        assert_err!(registry.resolve_active("alice").await);
    } else {
        let resolved = assert_ok!(registry.resolve_active("alice").await);
        let last = entries.last().unwrap();
        assert!(resolved.handle.same_client(&last.handle));
        assert!(entries.iter().all(|c| c.active));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exclusive_policy_never_leaves_two_active() {
    let registry = Arc::new(ConnectionRegistry::new(ActivationPolicy::Exclusive));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let label = format!("db{}", i % 4);
            if i < 8 {
                registry
                    .register(
                        "alice",
                        Some(label.as_str()),
                        Box::new(MockDatabaseClient::new(Dialect::Postgres)),
                    )
                    .await;
            } else {
                let _ = registry.activate_label("alice", &label).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let active = registry
        .connections("alice")
        .await
        .into_iter()
        .filter(|c| c.active)
        .count();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn test_same_handle_statements_are_serialized() {
    let registry = ConnectionRegistry::default();
    let mock = MockDatabaseClient::new(Dialect::Sqlite)
        .with_result(QueryResult::default())
        .with_delay(Duration::from_millis(50));
    let tracker = mock.tracker();
    let connection = registry.register("alice", None, Box::new(mock)).await;
    let engine = ExecutionEngine::default();
    let token = CancellationToken::new();

    let started = Instant::now();
    let (a, b) = tokio::join!(
        engine.execute(&connection, "SELECT 1", &token),
        engine.execute(&connection, "SELECT 2", &token),
    );
    assert_ok!(a);
    assert_ok!(b);

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(tracker.statements().len(), 2);
}

#[tokio::test]
async fn test_release_of_other_tenant_does_not_block() {
    let registry = ConnectionRegistry::default();
    let slow = MockDatabaseClient::new(Dialect::Sqlite)
        .with_result(QueryResult::default())
        .with_delay(Duration::from_millis(200));
    let alice = registry.register("alice", None, Box::new(slow)).await;
    registry
        .register("bob", None, Box::new(MockDatabaseClient::new(Dialect::Sqlite)))
        .await;

    let engine = ExecutionEngine::default();
    let token = CancellationToken::new();
    let running = engine.execute(&alice, "SELECT pg_sleep(1)", &token);
    let release_bob = async {
        let started = Instant::now();
        let released = registry.release("bob").await;
        (released, started.elapsed())
    };

    let (result, (released, elapsed)) = tokio::join!(running, release_bob);
    assert_ok!(result);
    assert_eq!(released, 1);
    assert!(elapsed < Duration::from_millis(200));
    assert!(matches!(
        registry.resolve_active("bob").await,
        Err(GatewayError::NoConnection(_))
    ));
}
