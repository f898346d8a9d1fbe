//! SQLite-backed connection log

use super::{AuditSink, ConnectionAttempt};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kubetcd_common::{ConnectionOutcome, ConnectionRecord, Result};
use sqlx::{Row, SqlitePool};
use tracing::error;

/// Cap on records returned by a single listing
pub const MAX_CONNECTION_RECORDS: u32 = 100;

/// Writes connection attempts to the `cluster_connections` table
#[derive(Debug, Clone)]
pub struct SqliteAuditSink {
    db: SqlitePool,
}

impl SqliteAuditSink {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Most recent attempts first, optionally for one cluster
    pub async fn list_connections(
        &self,
        cluster_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<ConnectionRecord>> {
        let limit = limit.clamp(1, MAX_CONNECTION_RECORDS) as i64;

        let rows = sqlx::query(
            r#"
            SELECT cc.id, cc.cluster_id, c.name AS cluster_name, cc.user_id,
                   cc.connected_at, cc.status, cc.error_message
            FROM cluster_connections cc
            LEFT JOIN clusters c ON c.id = cc.cluster_id
            WHERE (?1 IS NULL OR cc.cluster_id = ?1)
            ORDER BY cc.connected_at DESC, cc.id DESC
            LIMIT ?2
            "#,
        )
        .bind(cluster_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .map_err(|e| {
            kubetcd_common::Error::System(format!("Failed to query connection log: {}", e))
        })?;

        rows.iter()
            .map(|row| {
                let status: String = row.get("status");
                let connected_at: DateTime<Utc> = row.try_get("connected_at").map_err(|e| {
                    kubetcd_common::Error::System(format!("Bad connection timestamp: {}", e))
                })?;

                Ok(ConnectionRecord {
                    id: row.get("id"),
                    cluster_id: row.get("cluster_id"),
                    cluster_name: row.get("cluster_name"),
                    user_id: row.get("user_id"),
                    connected_at,
                    status: ConnectionOutcome::parse(&status).unwrap_or(ConnectionOutcome::Failed),
                    error_message: row.get("error_message"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record_connection_attempt(&self, attempt: &ConnectionAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cluster_connections (
                cluster_id, user_id, connected_at, status, error_message
            ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.cluster_id)
        .bind(&attempt.user_id)
        .bind(attempt.connected_at)
        .bind(attempt.outcome.as_str())
        .bind(&attempt.error_message)
        .execute(&self.db)
        .await
        .map_err(|e| {
            error!("Failed to insert connection record: {}", e);
            kubetcd_common::Error::System(format!("Failed to record connection: {}", e))
        })?;

        Ok(())
    }
}
