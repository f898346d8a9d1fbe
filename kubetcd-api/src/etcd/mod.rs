//! etcd key service
//!
//! Composes the credential vault, the cluster gateway and the remote
//! executor into key list/get/put/delete, health and tree operations whose
//! results do not depend on etcdctl's text format.
//!
//! Each call decrypts the cluster's credential, opens its own gateway
//! session, locates the etcd pod and runs one or more etcdctl commands.
//! Nothing is pooled or cached between calls.

pub mod command;
pub mod tree;

use kubetcd_common::etcd::{
    DeleteResult, EtcdHealthReport, KeyList, KeyTree, KeyValue, DEFAULT_KEY_LIMIT,
    DEFAULT_TREE_LIMIT,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::audit::{AuditSink, ConnectionAttempt};
use crate::encryption::{CredentialVault, VaultError};
use crate::kubernetes::exec::{self, CommandResult, FailureKind};
use crate::kubernetes::{ClusterGateway, ClusterInfo, GatewayError, GatewaySession, PodReference, PodSelector};
use crate::validation;
use command::EtcdctlConfig;

/// Failures of an etcd operation
#[derive(Debug, Error)]
pub enum EtcdError {
    #[error("Invalid cluster credential: {0}")]
    InvalidCredentialFormat(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("etcd pod not found: {0}")]
    PodNotFound(String),

    #[error("etcdctl timed out after {0}s")]
    CommandTimeout(u64),

    #[error("etcdctl failed: {0}")]
    CommandFailed(String),

    #[error("Credential decryption failed: {0}")]
    Decryption(String),

    #[error("Invalid input: {0}")]
    MalformedInput(String),

    #[error("Cluster not found: {0}")]
    ClusterNotFound(i64),
}

impl From<GatewayError> for EtcdError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidCredentialFormat(msg) => EtcdError::InvalidCredentialFormat(msg),
            GatewayError::ConnectionError(msg) => EtcdError::ConnectionError(msg),
            e @ GatewayError::PodNotFound { .. } => EtcdError::PodNotFound(e.to_string()),
        }
    }
}

impl From<VaultError> for EtcdError {
    fn from(err: VaultError) -> Self {
        EtcdError::Decryption(err.to_string())
    }
}

impl From<kubetcd_common::Error> for EtcdError {
    fn from(err: kubetcd_common::Error) -> Self {
        match err {
            kubetcd_common::Error::Validation(msg) => EtcdError::MalformedInput(msg),
            other => EtcdError::MalformedInput(other.to_string()),
        }
    }
}

pub type EtcdResult<T> = std::result::Result<T, EtcdError>;

/// Where etcd lives and how long commands may run
#[derive(Debug, Clone)]
pub struct EtcdSettings {
    pub selector: PodSelector,
    pub etcdctl: EtcdctlConfig,
    pub command_timeout: Duration,
    pub default_list_limit: u32,
    pub default_tree_limit: u32,
}

impl Default for EtcdSettings {
    fn default() -> Self {
        Self {
            selector: PodSelector::default(),
            etcdctl: EtcdctlConfig::default(),
            command_timeout: Duration::from_secs(30),
            default_list_limit: DEFAULT_KEY_LIMIT,
            default_tree_limit: DEFAULT_TREE_LIMIT,
        }
    }
}

/// Process-wide collaborators shared by every service instance
pub struct EtcdContext {
    pub gateway: ClusterGateway,
    pub vault: CredentialVault,
    pub audit: Arc<dyn AuditSink>,
    pub settings: EtcdSettings,
}

/// Cluster an operation runs against and who asked
#[derive(Clone)]
pub struct ClusterTarget {
    pub cluster_id: i64,
    pub user_id: Option<String>,
    pub encrypted_credential: Vec<u8>,
}

impl std::fmt::Debug for ClusterTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterTarget")
            .field("cluster_id", &self.cluster_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

pub struct EtcdKeyService {
    ctx: Arc<EtcdContext>,
    target: ClusterTarget,
}

impl EtcdKeyService {
    pub fn new(ctx: Arc<EtcdContext>, target: ClusterTarget) -> Self {
        Self { ctx, target }
    }

    /// Prefixed range scan in etcd's lexicographic order
    pub async fn list_keys(
        &self,
        prefix: &str,
        keys_only: bool,
        limit: Option<u32>,
    ) -> EtcdResult<KeyList> {
        let limit = limit.unwrap_or(self.ctx.settings.default_list_limit);
        validation::validate_prefix(prefix)?;
        validation::validate_limit(limit)?;

        crate::log_etcd_operation!("list", self.target.cluster_id, prefix = prefix);
        let result = self.list_keys_inner(prefix, keys_only, limit).await;
        self.audited("list", result).await
    }

    pub async fn get_value(&self, key: &str) -> EtcdResult<KeyValue> {
        validation::validate_key(key)?;

        crate::log_etcd_operation!("get", self.target.cluster_id, key = key);
        let result = self.get_value_inner(key).await;
        self.audited("get", result).await
    }

    /// Unconditional upsert
    pub async fn put_value(&self, key: &str, value: &str) -> EtcdResult<()> {
        validation::validate_key(key)?;
        validation::validate_value(value)?;

        crate::log_etcd_operation!("put", self.target.cluster_id, key = key);
        let result = self.put_value_inner(key, value).await;
        self.audited("put", result).await
    }

    pub async fn delete_key(&self, key: &str, prefix: bool) -> EtcdResult<DeleteResult> {
        validation::validate_key(key)?;

        crate::log_etcd_operation!("delete", self.target.cluster_id, key = key, prefix = prefix);
        let result = self.delete_key_inner(key, prefix).await;
        self.audited("delete", result).await
    }

    /// Endpoint health, endpoint status and member list from one session.
    ///
    /// The three queries run concurrently and fill their fields
    /// independently. Only a failure to reach the pod fails the call.
    pub async fn cluster_health(&self) -> EtcdResult<EtcdHealthReport> {
        crate::log_etcd_operation!("health", self.target.cluster_id);

        let report = match self.cluster_health_inner().await {
            Ok(report) => report,
            Err(e) => return self.audited("health", Err(e)).await,
        };

        let all_failed =
            report.health.is_none() && report.status.is_none() && report.members.is_none();
        if all_failed {
            let reasons: Vec<String> = report
                .errors
                .iter()
                .map(|(field, reason)| format!("{}: {}", field, reason))
                .collect();
            self.record("health", Some(reasons.join("; "))).await;
        } else {
            self.record("health", None).await;
        }

        Ok(report)
    }

    /// Hierarchical view of up to `limit` keys under `prefix`
    pub async fn build_tree(&self, prefix: &str, limit: Option<u32>) -> EtcdResult<KeyTree> {
        let limit = limit.unwrap_or(self.ctx.settings.default_tree_limit);
        validation::validate_prefix(prefix)?;
        validation::validate_limit(limit)?;

        crate::log_etcd_operation!("tree", self.target.cluster_id, prefix = prefix);
        let result = self
            .list_keys_inner(prefix, true, limit)
            .await
            .map(|listing| KeyTree {
                count: listing.count,
                tree: tree::build_tree(&listing.keys),
            });
        self.audited("tree", result).await
    }

    /// API server version and node count; also serves as a connection test
    pub async fn cluster_info(&self) -> EtcdResult<ClusterInfo> {
        crate::log_etcd_operation!("cluster_info", self.target.cluster_id);
        let result = self.cluster_info_inner().await;
        self.audited("cluster_info", result).await
    }

    async fn list_keys_inner(&self, prefix: &str, keys_only: bool, limit: u32) -> EtcdResult<KeyList> {
        let (session, pod) = self.connect_to_pod().await?;
        let output = self
            .run(&session, &pod, command::list_args(prefix, keys_only, limit))
            .await?;

        if keys_only {
            let keys = command::parse_key_lines(&output);
            return Ok(KeyList {
                count: keys.len(),
                keys,
                entries: Vec::new(),
            });
        }

        let entries = command::parse_json_listing(&output).map_err(EtcdError::CommandFailed)?;
        Ok(KeyList {
            count: entries.len(),
            keys: entries.iter().map(|e| e.key.clone()).collect(),
            entries,
        })
    }

    async fn get_value_inner(&self, key: &str) -> EtcdResult<KeyValue> {
        let (session, pod) = self.connect_to_pod().await?;
        let output = self.run(&session, &pod, command::get_args(key)).await?;

        let entry = command::parse_json_listing(&output)
            .map_err(EtcdError::CommandFailed)?
            .into_iter()
            .find(|entry| entry.key == key);

        Ok(match entry {
            Some(entry) => KeyValue {
                key: entry.key,
                value: entry.value,
                found: true,
                binary: entry.binary,
            },
            None => KeyValue {
                key: key.to_string(),
                value: String::new(),
                found: false,
                binary: false,
            },
        })
    }

    async fn put_value_inner(&self, key: &str, value: &str) -> EtcdResult<()> {
        let (session, pod) = self.connect_to_pod().await?;
        self.run(&session, &pod, command::put_args(key, value))
            .await?;
        Ok(())
    }

    async fn delete_key_inner(&self, key: &str, prefix: bool) -> EtcdResult<DeleteResult> {
        let (session, pod) = self.connect_to_pod().await?;
        let output = self
            .run(&session, &pod, command::delete_args(key, prefix))
            .await?;

        let deleted = command::parse_delete_count(&output).map_err(EtcdError::CommandFailed)?;
        Ok(DeleteResult {
            key: key.to_string(),
            deleted,
        })
    }

    async fn cluster_health_inner(&self) -> EtcdResult<EtcdHealthReport> {
        let (session, pod) = self.connect_to_pod().await?;

        let (health, status, members) = tokio::join!(
            self.run(&session, &pod, command::endpoint_health_args()),
            self.run(&session, &pod, command::endpoint_status_args()),
            self.run(&session, &pod, command::member_list_args()),
        );

        let mut errors = BTreeMap::new();
        let health = health_field("health", health, &mut errors);
        let status = health_field("status", status, &mut errors);
        let members = health_field("members", members, &mut errors);

        Ok(EtcdHealthReport {
            health,
            status,
            members,
            errors,
        })
    }

    async fn cluster_info_inner(&self) -> EtcdResult<ClusterInfo> {
        let session = self.connect().await?;
        Ok(session.cluster_info().await?)
    }

    async fn connect(&self) -> EtcdResult<GatewaySession> {
        let credential = self.ctx.vault.open(&self.target.encrypted_credential)?;
        let session = self.ctx.gateway.open(&credential).await?;
        Ok(session)
    }

    async fn connect_to_pod(&self) -> EtcdResult<(GatewaySession, PodReference)> {
        let session = self.connect().await?;
        let pod = session.find_pod(&self.ctx.settings.selector).await?;
        Ok((session, pod))
    }

    async fn run(
        &self,
        session: &GatewaySession,
        pod: &PodReference,
        args: Vec<String>,
    ) -> EtcdResult<String> {
        let argv = self.ctx.settings.etcdctl.command(args);
        let timeout = self.ctx.settings.command_timeout;

        match exec::exec(session, pod, &argv, timeout).await {
            CommandResult::Success { output } => Ok(output),
            CommandResult::Failure {
                kind: FailureKind::Timeout,
                ..
            } => Err(EtcdError::CommandTimeout(timeout.as_secs())),
            CommandResult::Failure {
                reason,
                kind: FailureKind::NonZeroExit(_),
            } => Err(EtcdError::CommandFailed(reason)),
            CommandResult::Failure {
                reason,
                kind: FailureKind::Transport,
            } => Err(EtcdError::ConnectionError(reason)),
        }
    }

    async fn audited<T>(&self, operation: &str, result: EtcdResult<T>) -> EtcdResult<T> {
        let error = result.as_ref().err().map(|e| e.to_string());
        self.record(operation, error).await;
        result
    }

    /// Audit failures are logged and otherwise ignored
    async fn record(&self, operation: &str, error: Option<String>) {
        let attempt = match error {
            None => ConnectionAttempt::success(
                self.target.cluster_id,
                self.target.user_id.clone(),
                operation,
            ),
            Some(error) => ConnectionAttempt::failed(
                self.target.cluster_id,
                self.target.user_id.clone(),
                operation,
                error,
            ),
        };

        if let Err(e) = self.ctx.audit.record_connection_attempt(&attempt).await {
            warn!(
                cluster_id = self.target.cluster_id,
                operation = operation,
                error = %e,
                "Failed to record connection attempt"
            );
        }
    }
}

fn health_field(
    field: &str,
    result: EtcdResult<String>,
    errors: &mut BTreeMap<String, String>,
) -> Option<serde_json::Value> {
    match result {
        Ok(output) => Some(command::parse_json_or_raw(&output)),
        Err(e) => {
            errors.insert(field.to_string(), e.to_string());
            None
        }
    }
}
