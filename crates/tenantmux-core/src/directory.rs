//! In-memory tenant directory.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Metadata for one tenant. Replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub id: String,
    pub name: String,
    /// Opaque to this process; handed to tools as-is.
    #[serde(default)]
    pub connection_info: String,
}

impl TenantRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        connection_info: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            connection_info: connection_info.into(),
        }
    }

    /// Ids double as URL path segments, so they must be non-empty and free
    /// of `/`.
    pub fn has_valid_id(&self) -> bool {
        !self.id.is_empty() && !self.id.contains('/')
    }

    /// Name to show to users, falling back to the id when the name is blank.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Thread-safe tenant lookup table.
///
/// Cloning is cheap and every clone sees the same records.
#[derive(Clone, Default)]
pub struct TenantDirectory {
    tenants: Arc<RwLock<BTreeMap<String, TenantRecord>>>,
}

impl TenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory pre-populated with `records`. Later duplicates win.
    pub fn with_tenants(records: impl IntoIterator<Item = TenantRecord>) -> Self {
        let tenants = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            tenants: Arc::new(RwLock::new(tenants)),
        }
    }

    /// Find a tenant by id. A single leading `/` is ignored; matching is
    /// otherwise exact and case-sensitive.
    pub async fn lookup(&self, id: &str) -> Option<TenantRecord> {
        let id = id.strip_prefix('/').unwrap_or(id);
        if id.is_empty() {
            return None;
        }
        self.tenants.read().await.get(id).cloned()
    }

    /// All tenants, ordered by id.
    pub async fn list(&self) -> Vec<TenantRecord> {
        self.tenants.read().await.values().cloned().collect()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.tenants.read().await.keys().cloned().collect()
    }

    /// Insert or replace the record with the same id.
    pub async fn add(&self, record: TenantRecord) {
        let id = record.id.clone();
        let replaced = self.tenants.write().await.insert(id.clone(), record);
        if replaced.is_some() {
            debug!(tenant_id = %id, "Tenant record replaced");
        } else {
            info!(tenant_id = %id, "Tenant added");
        }
    }

    /// Remove a tenant. Returns `true` if it existed.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.tenants.write().await.remove(id).is_some();
        if removed {
            info!(tenant_id = %id, "Tenant removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.tenants.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tenants.read().await.is_empty()
    }
}
