//! Gateway value types

use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "kube-system";
pub const DEFAULT_PRIMARY_SELECTOR: &str = "component=etcd";
pub const DEFAULT_FALLBACK_SELECTOR: &str = "tier=control-plane";
pub const DEFAULT_POD_MARKER: &str = "etcd";

/// Pod located within one gateway session. Not cached across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodReference {
    pub namespace: String,
    pub pod_name: String,
}

impl std::fmt::Display for PodReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.pod_name)
    }
}

/// How to find the pod that runs the command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSelector {
    pub namespace: String,
    /// Label selector; the first match wins
    pub primary: String,
    /// Label selector consulted only when the primary one matches nothing
    pub fallback: String,
    /// Substring a fallback pod's name must contain
    pub marker: String,
}

impl Default for PodSelector {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            primary: DEFAULT_PRIMARY_SELECTOR.to_string(),
            fallback: DEFAULT_FALLBACK_SELECTOR.to_string(),
            marker: DEFAULT_POD_MARKER.to_string(),
        }
    }
}

/// Cluster metadata reported by the API server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub version: String,
    pub node_count: u32,
}

/// Raw output of a process run through the exec channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (0 for success)
    pub exit_code: i32,
}
