//! Per-tenant registry of open backend connections.
//!
//! Every tenant maps to an ordered list of connections, most recently added
//! last. Handles are opened and closed outside the registry lock; the lock is
//! only held for the list manipulation itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{self, DatabaseClient};
use crate::dialect::Dialect;
use crate::error::{GatewayError, Result};

/// How `connect` and `use_database` treat a tenant's other active entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPolicy {
    /// New connections are appended active without touching older entries;
    /// the last active entry in list order is the one that resolves.
    #[default]
    LastActiveWins,
    /// Activating an entry first clears every other flag, so at most one
    /// entry per tenant is ever active.
    Exclusive,
}

impl std::str::FromStr for ActivationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "last_active_wins" => Ok(Self::LastActiveWins),
            "exclusive" => Ok(Self::Exclusive),
            _ => Err(format!(
                "Unknown activation policy: {s}. Valid options: last_active_wins, exclusive"
            )),
        }
    }
}

/// Shared, serialized access to one live backend client.
///
/// Clones refer to the same client; statements issued through different
/// clones queue on the same lock.
#[derive(Clone)]
pub struct ConnectionHandle {
    client: Arc<Mutex<Box<dyn DatabaseClient>>>,
}

impl ConnectionHandle {
    pub fn new(client: Box<dyn DatabaseClient>) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
        }
    }

    /// Waits for exclusive use of the client.
    pub async fn lock(&self) -> MutexGuard<'_, Box<dyn DatabaseClient>> {
        self.client.lock().await
    }

    /// Closes the client once any in-flight statement has finished.
    pub async fn close(&self) -> Result<()> {
        self.client.lock().await.close().await
    }

    /// Returns true if both handles refer to the same client.
    pub fn same_client(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.client, &other.client)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("shared", &Arc::strong_count(&self.client))
            .finish()
    }
}

/// One open backend link owned by a tenant.
#[derive(Debug, Clone)]
pub struct TenantConnection {
    pub dialect: Dialect,
    pub database_label: String,
    pub active: bool,
    pub handle: ConnectionHandle,
}

/// Generates the label used when the caller does not name a database.
fn placeholder_label(dialect: Dialect) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", dialect.driver(), &id[..8])
}

/// Owns the open connections of every tenant.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    tenants: RwLock<HashMap<String, Vec<TenantConnection>>>,
    policy: ActivationPolicy,
}

impl ConnectionRegistry {
    pub fn new(policy: ActivationPolicy) -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> ActivationPolicy {
        self.policy
    }

    /// Opens a backend and appends it to the tenant's list as active.
    ///
    /// A failed open leaves the registry untouched.
    pub async fn connect(
        &self,
        tenant: &str,
        dialect: Dialect,
        database_label: Option<&str>,
        connection_string: &str,
    ) -> Result<TenantConnection> {
        let client = db::open(dialect, connection_string).await?;
        Ok(self.register(tenant, database_label, client).await)
    }

    /// Appends an already opened client to the tenant's list as active.
    pub async fn register(
        &self,
        tenant: &str,
        database_label: Option<&str>,
        client: Box<dyn DatabaseClient>,
    ) -> TenantConnection {
        let dialect = client.dialect();
        let database_label = database_label
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| placeholder_label(dialect));

        let connection = TenantConnection {
            dialect,
            database_label,
            active: true,
            handle: ConnectionHandle::new(client),
        };

        let mut tenants = self.tenants.write().await;
        let entries = tenants.entry(tenant.to_string()).or_default();
        if self.policy == ActivationPolicy::Exclusive {
            entries.iter_mut().for_each(|c| c.active = false);
        }
        entries.push(connection.clone());

        info!(
            tenant,
            dialect = %dialect,
            label = %connection.database_label,
            total = entries.len(),
            "Registered connection"
        );
        connection
    }

    /// Returns the connection the tenant's requests should use.
    ///
    /// Scans in list order and keeps the last active entry found. A tenant
    /// with no entries, or with none active, has no connection.
    pub async fn resolve_active(&self, tenant: &str) -> Result<TenantConnection> {
        let tenants = self.tenants.read().await;
        tenants
            .get(tenant)
            .and_then(|entries| entries.iter().rev().find(|c| c.active))
            .cloned()
            .ok_or_else(|| GatewayError::no_connection(tenant))
    }

    /// Returns a snapshot of the tenant's connections in list order.
    pub async fn connections(&self, tenant: &str) -> Vec<TenantConnection> {
        let tenants = self.tenants.read().await;
        tenants.get(tenant).cloned().unwrap_or_default()
    }

    /// Clears the active flag on every entry of the tenant.
    pub async fn deactivate(&self, tenant: &str) -> usize {
        self.deactivate_where(tenant, |_| true).await
    }

    /// Clears the active flag on the tenant's entries of one dialect.
    pub async fn deactivate_dialect(&self, tenant: &str, dialect: Dialect) -> usize {
        self.deactivate_where(tenant, |c| c.dialect == dialect).await
    }

    /// Clears the active flag on the tenant's entries with the given label.
    pub async fn deactivate_label(&self, tenant: &str, database_label: &str) -> usize {
        self.deactivate_where(tenant, |c| c.database_label == database_label)
            .await
    }

    async fn deactivate_where<F>(&self, tenant: &str, predicate: F) -> usize
    where
        F: Fn(&TenantConnection) -> bool,
    {
        let mut tenants = self.tenants.write().await;
        let Some(entries) = tenants.get_mut(tenant) else {
            return 0;
        };

        let mut changed = 0;
        for connection in entries.iter_mut() {
            if connection.active && predicate(connection) {
                connection.active = false;
                changed += 1;
            }
        }
        debug!(tenant, changed, "Deactivated connections");
        changed
    }

    /// Makes a previously opened connection the one that resolves.
    ///
    /// The entry is moved to the end of the list so that the scan picks it
    /// up; under [`ActivationPolicy::Exclusive`] every other flag is cleared.
    /// When several entries share the label, the most recent one is used.
    pub async fn activate_label(
        &self,
        tenant: &str,
        database_label: &str,
    ) -> Result<TenantConnection> {
        let mut tenants = self.tenants.write().await;
        let entries = tenants
            .get_mut(tenant)
            .ok_or_else(|| GatewayError::no_connection(tenant))?;
        let position = entries
            .iter()
            .rposition(|c| c.database_label == database_label)
            .ok_or_else(|| {
                GatewayError::no_connection(format!("{tenant}' on database '{database_label}"))
            })?;

        if self.policy == ActivationPolicy::Exclusive {
            entries.iter_mut().for_each(|c| c.active = false);
        }
        let mut connection = entries.remove(position);
        connection.active = true;
        entries.push(connection.clone());

        info!(tenant, label = database_label, "Activated connection");
        Ok(connection)
    }

    /// Closes every handle of the tenant and forgets the tenant.
    ///
    /// Returns the number of handles released. Close failures are logged and
    /// do not stop the remaining handles from being released.
    pub async fn release(&self, tenant: &str) -> usize {
        let removed = {
            let mut tenants = self.tenants.write().await;
            tenants.remove(tenant).unwrap_or_default()
        };

        let count = removed.len();
        close_all(tenant, removed).await;
        if count > 0 {
            info!(tenant, count, "Released connections");
        }
        count
    }

    /// Releases the handles of every tenant.
    pub async fn release_all(&self) -> usize {
        let drained: Vec<(String, Vec<TenantConnection>)> = {
            let mut tenants = self.tenants.write().await;
            tenants.drain().collect()
        };

        let count = drained.iter().map(|(_, c)| c.len()).sum();
        join_all(
            drained
                .iter()
                .map(|(tenant, connections)| close_all(tenant, connections.clone())),
        )
        .await;
        info!(count, "Released all connections");
        count
    }

    /// Returns the number of tenants with at least one registered entry.
    pub async fn tenant_count(&self) -> usize {
        self.tenants.read().await.len()
    }
}

async fn close_all(tenant: &str, connections: Vec<TenantConnection>) {
    for connection in connections {
        if let Err(e) = connection.handle.close().await {
            warn!(
                tenant,
                label = %connection.database_label,
                "Failed to close connection: {e}"
            );
        }
    }
}
