//! Kubetcd API Library
//!
//! Registry of Kubernetes clusters, an encrypted store for their kubeconfigs,
//! and an etcd key browser that reaches etcd through `kubectl exec`-style
//! sessions into the cluster's etcd pod.

// Core modules
pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

// Application state
pub mod state;
pub use state::AppState;

// Credentials
pub mod encryption;

// Kubernetes gateway
pub mod kubernetes;

// etcd operations
pub mod etcd;

// Connection log
pub mod audit;

// Database
pub mod db;

// HTTP surface
pub mod health;
pub mod routes;
pub mod shutdown;
