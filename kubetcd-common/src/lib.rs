//! Common types shared between kubetcd-api and its clients

pub mod etcd;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered Kubernetes cluster, without its credential
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSummary {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

/// Request body for registering a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterCreateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Kubeconfig document; write-only, never echoed back
    pub kubeconfig: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Request body for updating a cluster; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kubeconfig: Option<String>,
    pub is_active: Option<bool>,
}

fn default_true() -> bool {
    true
}

/// Outcome of one connection attempt against a cluster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionOutcome {
    Success,
    Failed,
}

impl ConnectionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: i64,
    pub cluster_id: i64,
    pub cluster_name: Option<String>,
    pub user_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub status: ConnectionOutcome,
    #[serde(default)]
    pub error_message: String,
}

/// Result of probing a cluster's control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatusReport {
    pub cluster_id: i64,
    pub cluster_name: String,
    pub is_connected: bool,
    pub version: Option<String>,
    pub nodes_count: Option<u32>,
    pub error: Option<String>,
}

/// Kubeconfig validation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeconfigValidation {
    pub valid: bool,
    pub message: String,
}

/// Errors shared by validation and the connection log
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("System error: {0}")]
    System(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_outcome_strings() {
        assert_eq!(ConnectionOutcome::Success.to_string(), "success");
        assert_eq!(ConnectionOutcome::parse("failed"), Some(ConnectionOutcome::Failed));
        assert_eq!(ConnectionOutcome::parse("pending"), None);

        let json = serde_json::to_string(&ConnectionOutcome::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
    }

    #[test]
    fn test_create_request_defaults() {
        let req: ClusterCreateRequest =
            serde_json::from_str(r#"{"name":"prod","kubeconfig":"apiVersion: v1"}"#).unwrap();
        assert!(req.is_active);
        assert!(req.description.is_empty());
    }
}
