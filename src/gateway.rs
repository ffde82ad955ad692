//! The gateway facade.
//!
//! This is the single entry point for the presentation layer. Every
//! operation is keyed by a tenant identity string; connection and query
//! operations require the tenant to be logged in.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::io::AsyncRead;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GatewaySettings;
use crate::connection::{ConnectionRegistry, TenantConnection};
use crate::db::{self, DatabaseClient};
use crate::dialect::Dialect;
use crate::error::{AuthError, GatewayError, Result};
use crate::history::HistoryRecorder;
use crate::persistence::{ConnectionRecord, GatewayStore, HistoryFilter, QueryRecord};
use crate::query::{ExecutionEngine, TabularResult};
use crate::uploads::BlobStore;

/// Where a tenant stands, derived from the session set and the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantState {
    Anonymous,
    /// Logged in without a connection that resolves.
    Authenticated,
    /// Logged in with an active connection.
    Connected,
}

impl fmt::Display for TenantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Multi-tenant SQL gateway.
pub struct Gateway {
    registry: ConnectionRegistry,
    engine: ExecutionEngine,
    history: HistoryRecorder,
    store: Arc<dyn GatewayStore>,
    uploads: Arc<dyn BlobStore>,
    /// Logged-in tenants and the id of their current session.
    sessions: RwLock<HashMap<String, u64>>,
    next_session: AtomicU64,
    recent_window: Duration,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn GatewayStore>,
        uploads: Arc<dyn BlobStore>,
        settings: &GatewaySettings,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(settings.activation),
            engine: ExecutionEngine::new(settings.classifier.build()),
            history: HistoryRecorder::new(Arc::clone(&store)),
            store,
            uploads,
            sessions: RwLock::new(HashMap::new()),
            next_session: AtomicU64::new(1),
            recent_window: Duration::days(i64::from(settings.recent_connection_days)),
        }
    }

    /// Returns the underlying registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Registers a new user with the credential store.
    pub async fn register(&self, user: &str, password: &str) -> Result<()> {
        self.store.save_credentials(user, password).await?;
        info!(user, "Registered user");
        Ok(())
    }

    /// Checks credentials and starts a session for the tenant.
    pub async fn login(&self, user: &str, password: &str) -> Result<()> {
        self.store.check_credentials(user, password).await?;
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .write()
            .await
            .entry(user.to_string())
            .or_insert(session);
        info!(user, "Logged in");
        Ok(())
    }

    /// Releases every connection of the tenant and ends its session.
    ///
    /// Returns the number of connections released. Logging out an anonymous
    /// tenant is a no-op.
    pub async fn logout(&self, tenant: &str) -> usize {
        // The session ends first so a connect still in flight cannot register
        // behind the release.
        let was_logged_in = self.sessions.write().await.remove(tenant).is_some();
        let released = self.registry.release(tenant).await;
        if was_logged_in {
            info!(tenant, released, "Logged out");
        }
        released
    }

    /// Opens a backend connection and makes it the tenant's active one.
    pub async fn connect(
        &self,
        tenant: &str,
        dialect: Dialect,
        connection_string: &str,
        database_label: Option<&str>,
    ) -> Result<TenantConnection> {
        let session = self.require_session(tenant).await?;
        let client = db::open(dialect, connection_string).await?;
        let connection = self
            .register_in_session(tenant, session, database_label, client)
            .await?;
        self.save_connection_record(tenant, &connection, connection_string)
            .await;
        Ok(connection)
    }

    /// Stores an uploaded SQLite file in the tenant's storage and opens it.
    ///
    /// Without a label the connection is named after the file.
    pub async fn connect_from_upload(
        &self,
        tenant: &str,
        dialect: Dialect,
        database_label: Option<&str>,
        filename: &str,
        bytes: &[u8],
    ) -> Result<TenantConnection> {
        let session = self.require_session(tenant).await?;
        if dialect != Dialect::Sqlite {
            return Err(GatewayError::unsupported_dialect(format!(
                "uploads are only supported for sqlite, not {dialect}"
            )));
        }

        let path = self.uploads.store(tenant, filename, bytes).await?;
        let path_text = path.to_string_lossy().into_owned();
        let label = database_label
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .unwrap_or(filename);

        let client = db::open(dialect, &path_text).await?;
        let connection = self
            .register_in_session(tenant, session, Some(label), client)
            .await?;
        self.save_connection_record(tenant, &connection, &path_text)
            .await;
        Ok(connection)
    }

    /// Registers a client the caller opened itself, such as an embedded
    /// backend, as the tenant's active connection.
    pub async fn attach(
        &self,
        tenant: &str,
        database_label: Option<&str>,
        client: Box<dyn DatabaseClient>,
    ) -> Result<TenantConnection> {
        let session = self.require_session(tenant).await?;
        self.register_in_session(tenant, session, database_label, client)
            .await
    }

    /// Runs SQL text against the tenant's active connection.
    ///
    /// Successful statements are recorded in history. A failed history write
    /// is logged and does not fail the request.
    pub async fn execute_query(
        &self,
        tenant: &str,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<TabularResult>> {
        let connection = self.active_connection(tenant).await?;
        let result = self.engine.execute(&connection, sql, cancel).await?;
        self.record_history(tenant, &connection, sql).await;
        Ok(result)
    }

    /// Reads an uploaded file as one SQL text and runs it like [`Self::execute_query`].
    pub async fn execute_from_file<R>(
        &self,
        tenant: &str,
        file: Option<R>,
        cancel: &CancellationToken,
    ) -> Result<Option<TabularResult>>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.require_session(tenant).await?;
        let sql = self.engine.read_statement(file, cancel).await?;
        let connection = self.active_connection(tenant).await?;
        let result = self.engine.execute(&connection, &sql, cancel).await?;
        self.record_history(tenant, &connection, &sql).await;
        Ok(result)
    }

    /// Lists the user tables of the tenant's active database.
    pub async fn list_tables(&self, tenant: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let connection = self.active_connection(tenant).await?;
        self.engine.list_tables(&connection, cancel).await
    }

    /// Switches away from a backend by deactivating the tenant's entries of
    /// that dialect. Returns how many entries changed.
    pub async fn switch(&self, tenant: &str, dialect: Dialect) -> Result<usize> {
        self.require_session(tenant).await?;
        Ok(self.registry.deactivate_dialect(tenant, dialect).await)
    }

    /// Switches away from one database by deactivating entries with its label.
    pub async fn switch_database(&self, tenant: &str, database_label: &str) -> Result<usize> {
        self.require_session(tenant).await?;
        Ok(self.registry.deactivate_label(tenant, database_label).await)
    }

    /// Makes a previously opened database the active one again.
    pub async fn use_database(&self, tenant: &str, database_label: &str) -> Result<TenantConnection> {
        self.require_session(tenant).await?;
        self.registry.activate_label(tenant, database_label).await
    }

    /// Returns the tenant's history for the active database, oldest first.
    pub async fn get_history(&self, tenant: &str, filter: &HistoryFilter) -> Result<Vec<QueryRecord>> {
        let connection = self.active_connection(tenant).await?;
        self.history
            .fetch(tenant, &connection.database_label, filter)
            .await
    }

    /// Records a statement against the active database without running it.
    pub async fn save_query(&self, tenant: &str, sql: &str) -> Result<()> {
        let connection = self.active_connection(tenant).await?;
        self.history
            .record(
                tenant,
                connection.dialect,
                &connection.database_label,
                sql,
                Utc::now(),
            )
            .await
    }

    /// Returns the tenant's connection records inside the recent window, newest first.
    pub async fn recent_connections(&self, tenant: &str) -> Result<Vec<ConnectionRecord>> {
        self.require_session(tenant).await?;
        let since = Utc::now() - self.recent_window;
        self.store.fetch_recent_connections(tenant, since).await
    }

    pub async fn tenant_state(&self, tenant: &str) -> TenantState {
        if !self.sessions.read().await.contains_key(tenant) {
            return TenantState::Anonymous;
        }
        match self.registry.resolve_active(tenant).await {
            Ok(_) => TenantState::Connected,
            Err(_) => TenantState::Authenticated,
        }
    }

    /// Releases every tenant's connections and ends all sessions.
    pub async fn shutdown(&self) -> usize {
        self.sessions.write().await.clear();
        let released = self.registry.release_all().await;
        info!(released, "Gateway shut down");
        released
    }

    /// Returns the id of the tenant's current session.
    async fn require_session(&self, tenant: &str) -> Result<u64> {
        match self.sessions.read().await.get(tenant) {
            Some(session) => Ok(*session),
            None => Err(AuthError::NotLoggedIn(tenant.to_string()).into()),
        }
    }

    /// Registers a freshly opened client if `session` is still the tenant's
    /// current session, otherwise closes it.
    ///
    /// The session read lock is held across the registration, so a logout
    /// either sees the new entry and releases it or ends the session first.
    async fn register_in_session(
        &self,
        tenant: &str,
        session: u64,
        database_label: Option<&str>,
        client: Box<dyn DatabaseClient>,
    ) -> Result<TenantConnection> {
        let sessions = self.sessions.read().await;
        if sessions.get(tenant) != Some(&session) {
            drop(sessions);
            if let Err(e) = client.close().await {
                warn!(tenant, "Failed to close connection opened across logout: {e}");
            }
            return Err(AuthError::NotLoggedIn(tenant.to_string()).into());
        }
        let connection = self.registry.register(tenant, database_label, client).await;
        drop(sessions);
        Ok(connection)
    }

    async fn active_connection(&self, tenant: &str) -> Result<TenantConnection> {
        self.require_session(tenant).await?;
        self.registry.resolve_active(tenant).await
    }

    async fn record_history(&self, tenant: &str, connection: &TenantConnection, sql: &str) {
        if let Err(e) = self
            .history
            .record(
                tenant,
                connection.dialect,
                &connection.database_label,
                sql,
                Utc::now(),
            )
            .await
        {
            warn!(tenant, label = %connection.database_label, "Failed to record history: {e}");
        }
    }

    async fn save_connection_record(
        &self,
        tenant: &str,
        connection: &TenantConnection,
        connection_string: &str,
    ) {
        let record = ConnectionRecord {
            user: tenant.to_string(),
            dialect: connection.dialect,
            database_label: connection.database_label.clone(),
            connection_string: db::redact_connection_string(connection_string),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.save_connection_record(&record).await {
            warn!(tenant, label = %record.database_label, "Failed to save connection record: {e}");
        }
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("recent_window_days", &self.recent_window.num_days())
            .finish_non_exhaustive()
    }
}
