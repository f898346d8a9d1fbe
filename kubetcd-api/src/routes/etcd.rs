//! etcd key-space routes
//!
//! Each request loads the cluster's sealed kubeconfig, then hands it to an
//! [`EtcdKeyService`] bound to that cluster and the calling user.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use kubetcd_common::etcd::{
    DeleteKeyRequest, DeleteResult, EtcdHealthReport, KeyList, KeyListQuery, KeyQuery, KeyTree,
    KeyValue, PutValueRequest, TreeQuery,
};
use serde::Serialize;
use std::sync::Arc;

use super::{success, user_id, ApiResponse};
use crate::db::StoreError;
use crate::error::ApiError;
use crate::etcd::{ClusterTarget, EtcdError, EtcdKeyService};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/etcd/:id/keys", get(list_keys))
        .route("/api/etcd/:id/tree", get(key_tree))
        .route(
            "/api/etcd/:id/kv",
            get(get_value).post(put_value).delete(delete_key),
        )
        .route("/api/etcd/:id/health", get(etcd_health))
}

#[derive(Debug, Serialize)]
pub struct PutResult {
    pub key: String,
    pub message: String,
}

/// Inactive clusters are hidden from etcd operations
async fn key_service(
    state: &AppState,
    cluster_id: i64,
    headers: &HeaderMap,
) -> Result<EtcdKeyService, ApiError> {
    let stored = match state.credentials.load(cluster_id).await {
        Ok(stored) => stored,
        Err(StoreError::ClusterNotFound(id)) => return Err(EtcdError::ClusterNotFound(id).into()),
        Err(e) => return Err(e.into()),
    };

    if !stored.summary.is_active {
        return Err(EtcdError::ClusterNotFound(cluster_id).into());
    }

    Ok(EtcdKeyService::new(
        state.etcd.clone(),
        ClusterTarget {
            cluster_id,
            user_id: user_id(headers),
            encrypted_credential: stored.encrypted_credential,
        },
    ))
}

async fn list_keys(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Query(query): Query<KeyListQuery>,
) -> Result<Json<ApiResponse<KeyList>>, ApiError> {
    let service = key_service(&state, id, &headers).await?;
    let listing = service
        .list_keys(&query.prefix, query.keys_only, query.limit)
        .await?;
    Ok(success(listing))
}

async fn key_tree(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Query(query): Query<TreeQuery>,
) -> Result<Json<ApiResponse<KeyTree>>, ApiError> {
    let service = key_service(&state, id, &headers).await?;
    let tree = service.build_tree(&query.prefix, query.limit).await?;
    Ok(success(tree))
}

async fn get_value(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Query(query): Query<KeyQuery>,
) -> Result<Json<ApiResponse<KeyValue>>, ApiError> {
    let service = key_service(&state, id, &headers).await?;
    let value = service.get_value(&query.key).await?;
    Ok(success(value))
}

async fn put_value(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<PutValueRequest>,
) -> Result<Json<ApiResponse<PutResult>>, ApiError> {
    let service = key_service(&state, id, &headers).await?;
    service.put_value(&req.key, &req.value).await?;
    Ok(success(PutResult {
        message: format!("Stored value for {}", req.key),
        key: req.key,
    }))
}

async fn delete_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Query(req): Query<DeleteKeyRequest>,
) -> Result<Json<ApiResponse<DeleteResult>>, ApiError> {
    let service = key_service(&state, id, &headers).await?;
    let result = service.delete_key(&req.key, req.prefix).await?;
    Ok(success(result))
}

async fn etcd_health(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<EtcdHealthReport>>, ApiError> {
    let service = key_service(&state, id, &headers).await?;
    let report = service.cluster_health().await?;
    Ok(success(report))
}
