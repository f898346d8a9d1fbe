//! Cluster registry routes

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use kubetcd_common::{
    ClusterCreateRequest, ClusterStatusReport, ClusterSummary, ClusterUpdateRequest,
    ConnectionRecord, KubeconfigValidation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{success, user_id, ApiResponse};
use crate::audit::database::MAX_CONNECTION_RECORDS;
use crate::db::{ClusterChanges, NewCluster};
use crate::error::ApiError;
use crate::etcd::{ClusterTarget, EtcdKeyService};
use crate::state::AppState;
use crate::validation;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/clusters", get(list_clusters).post(create_cluster))
        .route("/api/clusters/validate-kubeconfig", post(validate_kubeconfig))
        .route(
            "/api/clusters/:id",
            get(get_cluster).put(update_cluster).delete(delete_cluster),
        )
        .route("/api/clusters/:id/status", get(cluster_status))
        .route("/api/clusters/:id/test-connection", post(test_connection))
        .route("/api/connections", get(list_connections))
}

#[derive(Debug, Serialize)]
pub struct ClusterList {
    pub clusters: Vec<ClusterSummary>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ClusterBody {
    pub cluster: ClusterSummary,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionTest {
    pub message: String,
    pub version: String,
    pub nodes_count: u32,
}

#[derive(Debug, Serialize)]
pub struct ConnectionList {
    pub connections: Vec<ConnectionRecord>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionQuery {
    pub cluster_id: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct KubeconfigBody {
    pub kubeconfig: String,
}

async fn list_clusters(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<ClusterList>>, ApiError> {
    let clusters = state.database.list_clusters().await?;
    Ok(success(ClusterList {
        count: clusters.len(),
        clusters,
    }))
}

async fn create_cluster(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ClusterCreateRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ClusterBody>>), ApiError> {
    validation::validate_cluster_name(&req.name)?;
    validation::validate_description(&req.description)?;
    validation::validate_kubeconfig(&req.kubeconfig)?;

    let encrypted_credential = state.vault().seal(&req.kubeconfig)?;
    let cluster = state
        .database
        .create_cluster(&NewCluster {
            name: req.name.trim().to_string(),
            description: req.description,
            encrypted_credential,
            is_active: req.is_active,
            created_by: user_id(&headers),
        })
        .await?;

    info!("Registered cluster {} ({})", cluster.name, cluster.id);
    Ok((StatusCode::CREATED, success(ClusterBody { cluster })))
}

async fn get_cluster(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ClusterBody>>, ApiError> {
    let stored = state.database.get_cluster(id).await?;
    Ok(success(ClusterBody {
        cluster: stored.summary,
    }))
}

async fn update_cluster(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ClusterUpdateRequest>,
) -> Result<Json<ApiResponse<ClusterBody>>, ApiError> {
    if let Some(name) = &req.name {
        validation::validate_cluster_name(name)?;
    }
    if let Some(description) = &req.description {
        validation::validate_description(description)?;
    }

    let encrypted_credential = match &req.kubeconfig {
        Some(kubeconfig) => {
            validation::validate_kubeconfig(kubeconfig)?;
            Some(state.vault().seal(kubeconfig)?)
        }
        None => None,
    };

    let cluster = state
        .database
        .update_cluster(
            id,
            &ClusterChanges {
                name: req.name.map(|name| name.trim().to_string()),
                description: req.description,
                encrypted_credential,
                is_active: req.is_active,
            },
        )
        .await?;

    info!("Updated cluster {} ({})", cluster.name, cluster.id);
    Ok(success(ClusterBody { cluster }))
}

async fn delete_cluster(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Message>>, ApiError> {
    state.database.delete_cluster(id).await?;

    info!("Deleted cluster {}", id);
    Ok(success(Message {
        message: format!("Cluster {} deleted", id),
    }))
}

/// Probe the control plane. Connection failures are reported in the body,
/// not as an error status.
async fn cluster_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<ClusterStatusReport>>, ApiError> {
    let stored = state.database.get_cluster(id).await?;
    let service = EtcdKeyService::new(
        state.etcd.clone(),
        ClusterTarget {
            cluster_id: id,
            user_id: user_id(&headers),
            encrypted_credential: stored.encrypted_credential,
        },
    );

    let report = match service.cluster_info().await {
        Ok(info) => ClusterStatusReport {
            cluster_id: id,
            cluster_name: stored.summary.name,
            is_connected: true,
            version: Some(info.version),
            nodes_count: Some(info.node_count),
            error: None,
        },
        Err(e) => {
            warn!("Cluster {} status check failed: {}", id, e);
            ClusterStatusReport {
                cluster_id: id,
                cluster_name: stored.summary.name,
                is_connected: false,
                version: None,
                nodes_count: None,
                error: Some(e.to_string()),
            }
        }
    };

    Ok(success(report))
}

async fn test_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<ConnectionTest>>, ApiError> {
    let stored = state.database.get_cluster(id).await?;
    let service = EtcdKeyService::new(
        state.etcd.clone(),
        ClusterTarget {
            cluster_id: id,
            user_id: user_id(&headers),
            encrypted_credential: stored.encrypted_credential,
        },
    );

    let info = service.cluster_info().await?;
    Ok(success(ConnectionTest {
        message: format!("Connected to {}", stored.summary.name),
        version: info.version,
        nodes_count: info.node_count,
    }))
}

/// Structural check only; never contacts the cluster
async fn validate_kubeconfig(Json(body): Json<KubeconfigBody>) -> Json<KubeconfigValidation> {
    let validation = match validation::validate_kubeconfig(&body.kubeconfig) {
        Ok(()) => KubeconfigValidation {
            valid: true,
            message: "Kubeconfig is valid".to_string(),
        },
        Err(e) => KubeconfigValidation {
            valid: false,
            message: e.to_string(),
        },
    };

    Json(validation)
}

async fn list_connections(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectionQuery>,
) -> Result<Json<ApiResponse<ConnectionList>>, ApiError> {
    let connections = state
        .connections
        .list_connections(query.cluster_id, query.limit.unwrap_or(MAX_CONNECTION_RECORDS))
        .await?;

    Ok(success(ConnectionList {
        count: connections.len(),
        connections,
    }))
}
