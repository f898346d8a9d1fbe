//! Database migrations

use super::{StoreError, StoreResult};
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            executed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::Migration(format!("Failed to create migrations table: {}", e)))?;

    // Applied in order; names are recorded and never re-run
    run_migration(pool, "001_create_clusters_table", MIGRATION_001_CREATE_CLUSTERS).await?;
    run_migration(
        pool,
        "002_create_cluster_connections_table",
        MIGRATION_002_CREATE_CLUSTER_CONNECTIONS,
    )
    .await?;

    Ok(())
}

async fn run_migration(pool: &SqlitePool, name: &str, sql: &str) -> StoreResult<()> {
    use sqlx::Row;

    let row = sqlx::query("SELECT COUNT(*) as count FROM migrations WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(|e| StoreError::Migration(format!("Migration check failed: {}", e)))?;

    let count: i64 = row.get("count");
    if count > 0 {
        tracing::debug!("Migration {} already applied", name);
        return Ok(());
    }

    tracing::info!("Running migration: {}", name);

    let mut tx = pool.begin().await?;

    sqlx::query(sql)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Migration(format!("Migration {} failed: {}", name, e)))?;

    sqlx::query("INSERT INTO migrations (name) VALUES (?)")
        .bind(name)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Migration(format!("Failed to record migration: {}", e)))?;

    tx.commit().await?;

    tracing::info!("Migration {} completed", name);

    Ok(())
}

const MIGRATION_001_CREATE_CLUSTERS: &str = "
CREATE TABLE clusters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    kubeconfig_encrypted BLOB NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    created_by TEXT
);

CREATE INDEX idx_clusters_active ON clusters(is_active);
";

const MIGRATION_002_CREATE_CLUSTER_CONNECTIONS: &str = "
CREATE TABLE cluster_connections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cluster_id INTEGER NOT NULL,
    user_id TEXT,
    connected_at TEXT NOT NULL,
    status TEXT NOT NULL,
    error_message TEXT NOT NULL DEFAULT '',
    FOREIGN KEY (cluster_id) REFERENCES clusters(id) ON DELETE CASCADE
);

CREATE INDEX idx_connections_cluster ON cluster_connections(cluster_id);
CREATE INDEX idx_connections_connected_at ON cluster_connections(connected_at);
";
