//! Gateway error types
//!
//! kube-rs errors are flattened into these variants before leaving the
//! gateway so callers never match on transport internals.

use thiserror::Error;

/// Control-plane gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Kubeconfig could not be parsed or turned into a client configuration
    #[error("Invalid kubeconfig: {0}")]
    InvalidCredentialFormat(String),

    /// API server unreachable, TLS failure, or a request against it failed
    #[error("Cluster connection failed: {0}")]
    ConnectionError(String),

    /// No pod matched the primary selector or the fallback selector and marker
    #[error("No pod matching {selector} found in namespace {namespace}")]
    PodNotFound { namespace: String, selector: String },
}

impl From<kube::Error> for GatewayError {
    fn from(err: kube::Error) -> Self {
        GatewayError::ConnectionError(err.to_string())
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
