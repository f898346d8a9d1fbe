//! Application State
//!
//! Shared state for the kubetcd API server

use std::sync::Arc;

use crate::audit::{AuditSink, SqliteAuditSink};
use crate::config::KubetcdConfig;
use crate::db::{CredentialStore, Database};
use crate::encryption::CredentialVault;
use crate::etcd::EtcdContext;
use crate::health::HealthProbe;
use crate::kubernetes::ClusterGateway;

/// Application state shared across all handlers
pub struct AppState {
    pub database: Arc<Database>,
    pub credentials: Arc<dyn CredentialStore>,
    pub connections: Arc<SqliteAuditSink>,
    pub etcd: Arc<EtcdContext>,
    pub health: Arc<HealthProbe>,
}

impl AppState {
    /// Wire the state around an opened, migrated database
    pub fn new(
        config: &KubetcdConfig,
        database: Database,
        gateway: ClusterGateway,
        vault: CredentialVault,
    ) -> Self {
        let connections = Arc::new(SqliteAuditSink::new(database.pool().clone()));
        let audit: Arc<dyn AuditSink> = connections.clone();

        let etcd = EtcdContext {
            gateway,
            vault,
            audit,
            settings: config.etcd.settings(),
        };

        let database = Arc::new(database);
        let credentials: Arc<dyn CredentialStore> = database.clone();

        Self {
            database,
            credentials,
            connections,
            etcd: Arc::new(etcd),
            health: Arc::new(HealthProbe::new(env!("CARGO_PKG_VERSION"))),
        }
    }

    /// Serve etcd routes from `credentials` instead of the cluster table
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.etcd.vault
    }
}
