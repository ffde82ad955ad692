//! Tenant-scoped storage for uploaded database files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{GatewayError, Result};

/// Namespace for tenant directory ids.
const TENANT_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_43a2_9c0e_4d57_8a41_2e9f_d3c7_b805);

/// Materializes uploaded bytes somewhere a backend can open them.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under the tenant's namespace and returns the local path.
    async fn store(&self, tenant: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Stores uploads as `<root>/<tenant-id>/<filename>` on the local filesystem.
///
/// The tenant directory is a name-based UUID of the tenant identity, so two
/// distinct tenants never share a directory. Writes into one tenant directory
/// are serialized, and each file is written to a temporary name first and then
/// renamed into place.
#[derive(Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
    tenant_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tenant_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the default upload root for the current platform.
    pub fn default_root() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| GatewayError::storage("Could not determine data directory"))?;
        Ok(data_dir.join("db-switchboard").join("uploads"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn tenant_lock(&self, tenant_dir: &str) -> Arc<Mutex<()>> {
        let mut locks = self.tenant_locks.lock().await;
        Arc::clone(locks.entry(tenant_dir.to_string()).or_default())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, tenant: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let tenant_dir = tenant_directory(tenant)?;
        let file_name = sanitize_component(filename)?;

        let lock = self.tenant_lock(&tenant_dir).await;
        let _guard = lock.lock().await;

        let dir = self.root.join(&tenant_dir);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            GatewayError::storage(format!("Failed to create {}: {e}", dir.display()))
        })?;

        let target = dir.join(&file_name);
        let staging = dir.join(format!(".{}.{}.part", file_name, Uuid::new_v4().simple()));
        tokio::fs::write(&staging, bytes).await.map_err(|e| {
            GatewayError::storage(format!("Failed to write {}: {e}", staging.display()))
        })?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(GatewayError::storage(format!(
                "Failed to move upload into {}: {e}",
                target.display()
            )));
        }

        debug!(tenant, path = %target.display(), size = bytes.len(), "Stored upload");
        Ok(target)
    }
}

/// Maps a tenant identity to its directory name.
pub fn tenant_directory(tenant: &str) -> Result<String> {
    if tenant.is_empty() {
        return Err(GatewayError::storage("tenant name must not be empty"));
    }
    Ok(Uuid::new_v5(&TENANT_NAMESPACE, tenant.as_bytes())
        .simple()
        .to_string())
}

/// Reduces a filename to a single safe path component.
fn sanitize_component(name: &str) -> Result<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        return Err(GatewayError::storage(format!(
            "'{name}' is not usable as a file name"
        )));
    }
    Ok(cleaned)
}
