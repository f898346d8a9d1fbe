//! Credential lookup seam
//!
//! The etcd routes only need "give me cluster N with its encrypted
//! credential"; [`Database`](super::Database) implements it over SQLite and
//! [`MemoryCredentialStore`] over a map.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{StoreError, StoreResult, StoredCluster};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `ClusterNotFound` when no such cluster exists
    async fn load(&self, cluster_id: i64) -> StoreResult<StoredCluster>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    clusters: Arc<RwLock<HashMap<i64, StoredCluster>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, cluster: StoredCluster) {
        self.clusters
            .write()
            .await
            .insert(cluster.summary.id, cluster);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, cluster_id: i64) -> StoreResult<StoredCluster> {
        self.clusters
            .read()
            .await
            .get(&cluster_id)
            .cloned()
            .ok_or(StoreError::ClusterNotFound(cluster_id))
    }
}
