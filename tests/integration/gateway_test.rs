//! End-to-end tests of the gateway facade over SQLite backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db_switchboard::config::GatewaySettings;
use db_switchboard::db::{MockDatabaseClient, QueryResult};
use db_switchboard::dialect::Dialect;
use db_switchboard::error::{GatewayError, Result};
use db_switchboard::gateway::{Gateway, TenantState};
use db_switchboard::persistence::{
    ConnectionRecord, GatewayStore, HistoryFilter, QueryRecord, StateDb,
};
use db_switchboard::uploads::LocalBlobStore;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Fixture {
    gateway: Arc<Gateway>,
    dir: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = StateDb::open(&dir.path().join("state.db")).await.unwrap();
        Self::with_store(Arc::new(store), dir)
    }

    fn with_store(store: Arc<dyn GatewayStore>, dir: TempDir) -> Self {
        let uploads = Arc::new(LocalBlobStore::new(dir.path().join("uploads")));
        let gateway = Gateway::new(store, uploads, &GatewaySettings::default());
        Self {
            gateway: Arc::new(gateway),
            dir,
        }
    }

    async fn user(&self, name: &str) {
        self.gateway.register(name, "pw").await.unwrap();
        self.gateway.login(name, "pw").await.unwrap();
    }

    fn db_url(&self, file: &str) -> String {
        format!("sqlite:{}?mode=rwc", self.dir.path().join(file).display())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_tenants_work_concurrently() {
    let fixture = Fixture::new().await;
    fixture.user("alice").await;
    fixture.user("bob").await;

    let mut tasks = Vec::new();
    for tenant in ["alice", "bob"] {
        let gateway = Arc::clone(&fixture.gateway);
        let url = fixture.db_url(&format!("{tenant}.db"));
        tasks.push(tokio::spawn(async move {
            let token = CancellationToken::new();
            gateway
                .connect(tenant, Dialect::Sqlite, &url, Some(tenant))
                .await
                .unwrap();
            gateway
                .execute_query(tenant, "CREATE TABLE owner (name TEXT)", &token)
                .await
                .unwrap();
            gateway
                .execute_query(
                    tenant,
                    &format!("INSERT INTO owner VALUES ('{tenant}')"),
                    &token,
                )
                .await
                .unwrap();
            gateway
                .execute_query(tenant, "SELECT name FROM owner", &token)
                .await
                .unwrap()
                .unwrap()
        }));
    }

    let mut owners = Vec::new();
    for task in tasks {
        owners.push(task.await.unwrap().rows[0][0].clone());
    }
    assert_eq!(owners, vec!["alice", "bob"]);

    let alice_history = fixture
        .gateway
        .get_history("alice", &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(alice_history.len(), 3);
    assert!(alice_history.iter().all(|r| r.user == "alice"));
}

#[tokio::test]
async fn test_logout_then_query_needs_login() {
    let fixture = Fixture::new().await;
    fixture.user("alice").await;
    let url = fixture.db_url("shop.db");
    let gateway = &fixture.gateway;

    gateway
        .connect("alice", Dialect::Sqlite, &url, Some("shop"))
        .await
        .unwrap();
    assert_eq!(gateway.logout("alice").await, 1);
    assert!(matches!(
        gateway.registry().resolve_active("alice").await,
        Err(GatewayError::NoConnection(_))
    ));

    let err = gateway
        .execute_query("alice", "SELECT 1", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.category(), "Authentication Error");

    gateway.login("alice", "pw").await.unwrap();
    assert_eq!(gateway.tenant_state("alice").await, TenantState::Authenticated);
    let recent = gateway.recent_connections("alice").await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].database_label, "shop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connect_racing_logout_leaves_nothing_open() {
    let fixture = Fixture::new().await;
    fixture.user("alice").await;
    let gateway = &fixture.gateway;

    for round in 0..20u64 {
        let connecting = {
            let gateway = Arc::clone(gateway);
            tokio::spawn(async move {
                gateway
                    .connect("alice", Dialect::Sqlite, "sqlite::memory:", Some("race"))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_micros(50 * round)).await;
        gateway.logout("alice").await;

        match connecting.await.unwrap() {
            Ok(_) | Err(GatewayError::Auth(_)) => {}
            Err(e) => panic!("unexpected connect error: {e}"),
        }
        assert_eq!(gateway.tenant_state("alice").await, TenantState::Anonymous);
        assert!(gateway.registry().connections("alice").await.is_empty());

        gateway.login("alice", "pw").await.unwrap();
    }
}

#[tokio::test]
async fn test_history_follows_active_label() {
    let fixture = Fixture::new().await;
    fixture.user("alice").await;
    let gateway = &fixture.gateway;
    let token = CancellationToken::new();

    gateway
        .connect("alice", Dialect::Sqlite, &fixture.db_url("a.db"), Some("a"))
        .await
        .unwrap();
    gateway
        .execute_query("alice", "SELECT 'on a'", &token)
        .await
        .unwrap();

    gateway
        .connect("alice", Dialect::Sqlite, &fixture.db_url("b.db"), Some("b"))
        .await
        .unwrap();
    gateway
        .execute_query("alice", "SELECT 'on b'", &token)
        .await
        .unwrap();

    let on_b = gateway
        .get_history("alice", &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(on_b.len(), 1);
    assert_eq!(on_b[0].statement, "SELECT 'on b'");

    gateway.use_database("alice", "a").await.unwrap();
    let on_a = gateway
        .get_history("alice", &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(on_a.len(), 1);
    assert_eq!(on_a[0].statement, "SELECT 'on a'");
}

#[tokio::test]
async fn test_execute_from_file() {
    let fixture = Fixture::new().await;
    fixture.user("alice").await;
    let gateway = &fixture.gateway;
    let token = CancellationToken::new();
    gateway
        .connect("alice", Dialect::Sqlite, &fixture.db_url("f.db"), Some("f"))
        .await
        .unwrap();

    let script = "CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1), (2);";
    let result = gateway
        .execute_from_file("alice", Some(script.as_bytes()), &token)
        .await
        .unwrap();
    assert!(result.is_none());

    let err = gateway
        .execute_from_file("alice", None::<&[u8]>, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::MissingFile));

    let tables = gateway.list_tables("alice", &token).await.unwrap();
    assert_eq!(tables, vec!["t"]);

    let history = gateway
        .get_history("alice", &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].statement, script);
}

#[tokio::test]
async fn test_cancelled_query_is_not_recorded() {
    let fixture = Fixture::new().await;
    fixture.user("alice").await;
    let gateway = &fixture.gateway;

    let slow = MockDatabaseClient::new(Dialect::Postgres)
        .with_result(QueryResult::default())
        .with_delay(Duration::from_secs(5));
    gateway.attach("alice", Some("slow"), Box::new(slow)).await.unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = gateway
        .execute_query("alice", "SELECT pg_sleep(5)", &token)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Cancelled));

    let history = gateway
        .get_history("alice", &HistoryFilter::default())
        .await
        .unwrap();
    assert!(history.is_empty());
}

/// Delegates to a real store but refuses to write history.
struct HistoryDownStore {
    inner: StateDb,
}

#[async_trait]
impl GatewayStore for HistoryDownStore {
    async fn save_credentials(&self, user: &str, password: &str) -> Result<()> {
        self.inner.save_credentials(user, password).await
    }

    async fn check_credentials(&self, user: &str, password: &str) -> Result<()> {
        self.inner.check_credentials(user, password).await
    }

    async fn save_connection_record(&self, record: &ConnectionRecord) -> Result<()> {
        self.inner.save_connection_record(record).await
    }

    async fn save_history_record(&self, _record: &QueryRecord) -> Result<()> {
        Err(GatewayError::persistence("history store offline"))
    }

    async fn fetch_history_records(
        &self,
        user: &str,
        database_label: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<QueryRecord>> {
        self.inner
            .fetch_history_records(user, database_label, filter)
            .await
    }

    async fn fetch_recent_connections(
        &self,
        user: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConnectionRecord>> {
        self.inner.fetch_recent_connections(user, since).await
    }
}

#[tokio::test]
async fn test_history_failure_does_not_fail_query() {
    let dir = tempfile::tempdir().unwrap();
    let inner = StateDb::open_in_memory().await.unwrap();
    let fixture = Fixture::with_store(Arc::new(HistoryDownStore { inner }), dir);
    fixture.user("alice").await;
    let gateway = &fixture.gateway;
    let token = CancellationToken::new();

    gateway
        .connect("alice", Dialect::Sqlite, "sqlite::memory:", Some("mem"))
        .await
        .unwrap();
    let table = gateway
        .execute_query("alice", "SELECT 42 AS answer", &token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(table.rows, vec![vec!["42".to_string()]]);

    let err = gateway.save_query("alice", "SELECT 42").await.unwrap_err();
    assert!(matches!(err, GatewayError::Persistence(_)));
}
