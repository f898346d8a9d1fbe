//! Connection audit trail
//!
//! Every etcd operation that reaches a cluster records exactly one
//! connection attempt. Sinks are fire-and-forget from the caller's point of
//! view: a failed write is logged, never surfaced.

pub mod database;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kubetcd_common::{ConnectionOutcome, Result};
use std::sync::Arc;
use tokio::sync::RwLock;

pub use database::SqliteAuditSink;

/// One attempt to reach a cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub cluster_id: i64,
    pub user_id: Option<String>,
    /// Operation that made the attempt, for logs only
    pub operation: String,
    pub outcome: ConnectionOutcome,
    pub error_message: String,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionAttempt {
    pub fn success(cluster_id: i64, user_id: Option<String>, operation: &str) -> Self {
        Self {
            cluster_id,
            user_id,
            operation: operation.to_string(),
            outcome: ConnectionOutcome::Success,
            error_message: String::new(),
            connected_at: Utc::now(),
        }
    }

    pub fn failed(
        cluster_id: i64,
        user_id: Option<String>,
        operation: &str,
        error: impl Into<String>,
    ) -> Self {
        Self {
            cluster_id,
            user_id,
            operation: operation.to_string(),
            outcome: ConnectionOutcome::Failed,
            error_message: error.into(),
            connected_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_connection_attempt(&self, attempt: &ConnectionAttempt) -> Result<()>;
}

/// In-memory sink, mostly for tests and database-less runs
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    attempts: Arc<RwLock<Vec<ConnectionAttempt>>>,
    failing: bool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every write fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub async fn attempts(&self) -> Vec<ConnectionAttempt> {
        self.attempts.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record_connection_attempt(&self, attempt: &ConnectionAttempt) -> Result<()> {
        if self.failing {
            return Err(kubetcd_common::Error::System(
                "audit sink unavailable".to_string(),
            ));
        }
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }
}
