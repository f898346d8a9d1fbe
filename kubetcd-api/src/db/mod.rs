//! Database layer using SQLite
//!
//! Persists registered clusters (with their encrypted kubeconfig) and the
//! connection log.

pub mod migrations;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kubetcd_common::ClusterSummary;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub use store::{CredentialStore, MemoryCredentialStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cluster not found: {0}")]
    ClusterNotFound(i64),

    #[error("Cluster name '{0}' already exists")]
    DuplicateName(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Cluster row including the encrypted credential
#[derive(Clone)]
pub struct StoredCluster {
    pub summary: ClusterSummary,
    pub encrypted_credential: Vec<u8>,
}

impl std::fmt::Debug for StoredCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCluster")
            .field("summary", &self.summary)
            .field("encrypted_credential", &format!("<{} bytes>", self.encrypted_credential.len()))
            .finish()
    }
}

/// Fields for a new cluster row
#[derive(Debug, Clone)]
pub struct NewCluster {
    pub name: String,
    pub description: String,
    pub encrypted_credential: Vec<u8>,
    pub is_active: bool,
    pub created_by: Option<String>,
}

/// Partial update; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct ClusterChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub encrypted_credential: Option<Vec<u8>>,
    pub is_active: Option<bool>,
}

/// Database connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        // Create parent directory if needed
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        StoreError::Database(sqlx::Error::Io(e))
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        tracing::info!("Database connection established");

        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection that never idles out,
    /// since every new connection would see an empty database.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        migrations::run_migrations(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap connectivity probe for health checks
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // Cluster operations
    pub async fn list_clusters(&self) -> StoreResult<Vec<ClusterSummary>> {
        clusters::list_clusters(&self.pool).await
    }

    pub async fn get_cluster(&self, id: i64) -> StoreResult<StoredCluster> {
        clusters::get_cluster(&self.pool, id).await
    }

    pub async fn create_cluster(&self, cluster: &NewCluster) -> StoreResult<ClusterSummary> {
        clusters::create_cluster(&self.pool, cluster).await
    }

    pub async fn update_cluster(
        &self,
        id: i64,
        changes: &ClusterChanges,
    ) -> StoreResult<ClusterSummary> {
        clusters::update_cluster(&self.pool, id, changes).await
    }

    pub async fn delete_cluster(&self, id: i64) -> StoreResult<()> {
        clusters::delete_cluster(&self.pool, id).await
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database connection closed");
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn load(&self, cluster_id: i64) -> StoreResult<StoredCluster> {
        self.get_cluster(cluster_id).await
    }
}

/// Cluster database operations
pub mod clusters {
    use super::*;
    use sqlx::sqlite::SqliteRow;
    use sqlx::Row;

    const COLUMNS: &str = "id, name, description, kubeconfig_encrypted, is_active, \
                           created_at, updated_at, created_by";

    fn map_unique(err: sqlx::Error, name: &str) -> StoreError {
        let unique_violation = err
            .as_database_error()
            .map(|db_err| db_err.is_unique_violation())
            .unwrap_or(false);

        if unique_violation {
            StoreError::DuplicateName(name.to_string())
        } else {
            StoreError::Database(err)
        }
    }

    pub async fn create_cluster(pool: &SqlitePool, cluster: &NewCluster) -> StoreResult<ClusterSummary> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO clusters (name, description, kubeconfig_encrypted, is_active,
                                   created_at, updated_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&cluster.name)
        .bind(&cluster.description)
        .bind(&cluster.encrypted_credential)
        .bind(cluster.is_active)
        .bind(now)
        .bind(now)
        .bind(&cluster.created_by)
        .execute(pool)
        .await
        .map_err(|e| map_unique(e, &cluster.name))?;

        tracing::debug!(cluster_id = result.last_insert_rowid(), "Cluster created");

        Ok(get_cluster(pool, result.last_insert_rowid()).await?.summary)
    }

    pub async fn get_cluster(pool: &SqlitePool, id: i64) -> StoreResult<StoredCluster> {
        let row = sqlx::query(&format!("SELECT {} FROM clusters WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::ClusterNotFound(id))?;

        row_to_cluster(&row)
    }

    pub async fn list_clusters(pool: &SqlitePool) -> StoreResult<Vec<ClusterSummary>> {
        let rows = sqlx::query(&format!("SELECT {} FROM clusters ORDER BY name", COLUMNS))
            .fetch_all(pool)
            .await?;

        rows.iter()
            .map(|row| row_to_cluster(row).map(|c| c.summary))
            .collect()
    }

    pub async fn update_cluster(
        pool: &SqlitePool,
        id: i64,
        changes: &ClusterChanges,
    ) -> StoreResult<ClusterSummary> {
        let current = get_cluster(pool, id).await?;

        let name = changes.name.clone().unwrap_or(current.summary.name);
        let description = changes
            .description
            .clone()
            .unwrap_or(current.summary.description);
        let credential = changes
            .encrypted_credential
            .clone()
            .unwrap_or(current.encrypted_credential);
        let is_active = changes.is_active.unwrap_or(current.summary.is_active);

        sqlx::query(
            "UPDATE clusters
             SET name = ?, description = ?, kubeconfig_encrypted = ?, is_active = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&name)
        .bind(&description)
        .bind(&credential)
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| map_unique(e, &name))?;

        Ok(get_cluster(pool, id).await?.summary)
    }

    pub async fn delete_cluster(pool: &SqlitePool, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM clusters WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ClusterNotFound(id));
        }

        Ok(())
    }

    fn row_to_cluster(row: &SqliteRow) -> StoreResult<StoredCluster> {
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(StoredCluster {
            summary: ClusterSummary {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                is_active: row.try_get("is_active")?,
                created_at,
                updated_at,
                created_by: row.try_get("created_by")?,
            },
            encrypted_credential: row.try_get("kubeconfig_encrypted")?,
        })
    }
}
