//! Kubernetes control-plane access
//!
//! Provides:
//! - Transient gateway sessions built from a kubeconfig
//! - etcd pod discovery by label selector
//! - Command execution in a pod with a bounded timeout

pub mod client;
pub mod error;
pub mod exec;
pub mod types;

pub use client::{ClusterGateway, Connector, ControlPlane, GatewaySession, KubeConnector};
pub use error::{GatewayError, GatewayResult};
pub use exec::{CommandResult, FailureKind};
pub use types::{ClusterInfo, ExecOutput, PodReference, PodSelector};
