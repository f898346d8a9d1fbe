//! Standardized error handling for API responses
//!
//! Every failure leaves the API as `{"success": false, "error": ...}` with a
//! status code chosen here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::db::StoreError;
use crate::encryption::VaultError;
use crate::etcd::EtcdError;

/// Standard API error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false; lets clients branch on one field for every response
    pub success: bool,

    /// HTTP status code
    pub status: u16,

    /// Error code for programmatic handling
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional detailed error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(status: u16, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            status,
            error: error.into(),
            message: message.into(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// API error types with standardized responses
#[derive(Debug)]
pub enum ApiError {
    /// 500 Internal Server Error
    Internal(String),

    /// 404 Not Found
    NotFound(String),

    /// 400 Bad Request
    BadRequest(String),

    /// 409 Conflict
    Conflict(String),

    /// 422 Unprocessable Entity
    ValidationError(String),

    /// 502 Bad Gateway: the cluster or etcd answered with an error
    BadGateway(String),

    /// 504 Gateway Timeout: the cluster or etcd did not answer in time
    GatewayTimeout(String),
}

impl ApiError {
    /// Convert error to ErrorResponse
    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            ApiError::Internal(msg) => {
                error!("Internal API error: {}", msg);
                ErrorResponse::new(500, "INTERNAL_ERROR", "An internal server error occurred")
                    .with_details(msg)
            }
            ApiError::NotFound(msg) => ErrorResponse::new(404, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => ErrorResponse::new(400, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => ErrorResponse::new(409, "CONFLICT", msg),
            ApiError::ValidationError(msg) => ErrorResponse::new(422, "VALIDATION_ERROR", msg),
            ApiError::BadGateway(msg) => ErrorResponse::new(502, "BAD_GATEWAY", msg),
            ApiError::GatewayTimeout(msg) => ErrorResponse::new(504, "GATEWAY_TIMEOUT", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_response = self.to_error_response();
        let status_code = StatusCode::from_u16(error_response.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        (status_code, Json(error_response)).into_response()
    }
}

impl From<kubetcd_common::Error> for ApiError {
    fn from(err: kubetcd_common::Error) -> Self {
        match err {
            kubetcd_common::Error::Validation(msg) => ApiError::BadRequest(msg),
            kubetcd_common::Error::System(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<EtcdError> for ApiError {
    fn from(err: EtcdError) -> Self {
        let message = err.to_string();
        match err {
            EtcdError::MalformedInput(_) => ApiError::BadRequest(message),
            EtcdError::ClusterNotFound(_) | EtcdError::PodNotFound(_) => ApiError::NotFound(message),
            EtcdError::InvalidCredentialFormat(_) => ApiError::ValidationError(message),
            EtcdError::ConnectionError(_) | EtcdError::CommandFailed(_) => {
                ApiError::BadGateway(message)
            }
            EtcdError::CommandTimeout(_) => ApiError::GatewayTimeout(message),
            EtcdError::Decryption(_) => ApiError::Internal(message),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ClusterNotFound(id) => {
                ApiError::NotFound(format!("Cluster '{}' not found", id))
            }
            StoreError::DuplicateName(name) => {
                ApiError::Conflict(format!("Cluster name '{}' already exists", name))
            }
            other => {
                error!("Database error: {}", other);
                ApiError::Internal("Database error occurred".to_string())
            }
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
