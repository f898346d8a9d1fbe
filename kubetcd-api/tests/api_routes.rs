//! API Route Tests
//! Full router over an in-memory database and a fake cluster

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{fake_gateway, test_vault, FakeCluster, KUBECONFIG, SERVER_VERSION};
use kubetcd_api::config::KubetcdConfig;
use kubetcd_api::db::{Database, MemoryCredentialStore, StoredCluster};
use kubetcd_api::{routes, AppState};
use kubetcd_common::ClusterSummary;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_app(cluster: &FakeCluster) -> Router {
    let database = Database::in_memory().await.unwrap();
    database.migrate().await.unwrap();

    let state = AppState::new(
        &KubetcdConfig::default(),
        database,
        fake_gateway(cluster),
        test_vault(),
    );
    routes::router(Arc::new(state))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", "operator");

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

async fn register(app: &Router, name: &str) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/api/clusters",
        Some(json!({"name": name, "description": "test", "kubeconfig": KUBECONFIG})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["cluster"]["id"].as_i64().unwrap()
}

/// Etcd routes backed by an in-memory credential store holding `clusters`
async fn memory_app(cluster: &FakeCluster, clusters: Vec<(i64, bool)>) -> Router {
    let database = Database::in_memory().await.unwrap();
    database.migrate().await.unwrap();

    let store = MemoryCredentialStore::new();
    for (id, is_active) in clusters {
        let now = chrono::Utc::now();
        store
            .insert(StoredCluster {
                summary: ClusterSummary {
                    id,
                    name: format!("mem-{}", id),
                    description: String::new(),
                    is_active,
                    created_at: now,
                    updated_at: now,
                    created_by: None,
                },
                encrypted_credential: test_vault().seal(KUBECONFIG).unwrap(),
            })
            .await;
    }

    let state = AppState::new(
        &KubetcdConfig::default(),
        database,
        fake_gateway(cluster),
        test_vault(),
    )
    .with_credentials(Arc::new(store));
    routes::router(Arc::new(state))
}

// ============== Cluster Registry Tests ==============

#[tokio::test]
async fn test_cluster_crud() {
    let app = test_app(&FakeCluster::new()).await;

    let id = register(&app, "prod").await;

    let (status, body) = send(&app, "GET", &format!("/api/clusters/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["cluster"]["name"], "prod");
    assert_eq!(body["cluster"]["created_by"], "operator");
    assert!(body["cluster"].get("kubeconfig").is_none());

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/clusters/{}", id),
        Some(json!({"description": "production"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cluster"]["description"], "production");

    let (_, body) = send(&app, "GET", "/api/clusters", None).await;
    assert_eq!(body["count"], 1);

    let (status, _) = send(&app, "DELETE", &format!("/api/clusters/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", &format!("/api/clusters/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_duplicate_cluster_name() {
    let app = test_app(&FakeCluster::new()).await;
    register(&app, "staging").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/clusters",
        Some(json!({"name": "staging", "kubeconfig": KUBECONFIG})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_create_rejects_bad_kubeconfig() {
    let app = test_app(&FakeCluster::new()).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/clusters",
        Some(json!({"name": "broken", "kubeconfig": "- just\n- a list\n"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_validate_kubeconfig() {
    let app = test_app(&FakeCluster::new()).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/clusters/validate-kubeconfig",
        Some(json!({"kubeconfig": KUBECONFIG})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    let (_, body) = send(
        &app,
        "POST",
        "/api/clusters/validate-kubeconfig",
        Some(json!({"kubeconfig": ""})),
    )
    .await;
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn test_cluster_status_and_connection_log() {
    let cluster = FakeCluster::new();
    let app = test_app(&cluster).await;
    let id = register(&app, "prod").await;

    let (status, body) = send(&app, "GET", &format!("/api/clusters/{}/status", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_connected"], true);
    assert_eq!(body["version"], SERVER_VERSION);
    assert_eq!(body["nodes_count"], 3);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/clusters/{}/test-connection", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = send(&app, "GET", &format!("/api/connections?cluster_id={}", id), None).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["connections"][0]["cluster_name"], "prod");
    assert_eq!(body["connections"][0]["user_id"], "operator");
    assert_eq!(body["connections"][0]["status"], "success");
}

#[tokio::test]
async fn test_status_reports_unreachable_cluster() {
    // no etcd pod is needed for status, but a bad kubeconfig fails the connect
    let app = test_app(&FakeCluster::new()).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/clusters",
        Some(json!({"name": "odd", "kubeconfig": "kind: Config\n"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["cluster"]["id"].as_i64().unwrap();

    let (status, body) = send(&app, "GET", &format!("/api/clusters/{}/status", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_connected"], false);
    assert!(body["error"].as_str().unwrap().contains("credential"));

    let (_, body) = send(&app, "GET", "/api/connections", None).await;
    assert_eq!(body["connections"][0]["status"], "failed");
}

// ============== etcd Route Tests ==============

#[tokio::test]
async fn test_etcd_kv_routes() {
    let cluster = FakeCluster::new();
    let app = test_app(&cluster).await;
    let id = register(&app, "prod").await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/etcd/{}/kv", id),
        Some(json!({"key": "/app/mode", "value": "blue"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(cluster.value("/app/mode").as_deref(), Some("blue"));

    let (_, body) = send(&app, "GET", &format!("/api/etcd/{}/kv?key=/app/mode", id), None).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["found"], true);
    assert_eq!(body["value"], "blue");

    let (_, body) = send(&app, "GET", &format!("/api/etcd/{}/keys?prefix=/app/", id), None).await;
    assert_eq!(body["keys"], json!(["/app/mode"]));
    assert_eq!(body["count"], 1);

    let (_, body) = send(&app, "GET", &format!("/api/etcd/{}/tree", id), None).await;
    assert_eq!(body["tree"][0]["name"], "app");
    assert_eq!(body["tree"][0]["children"][0]["key"], "/app/mode");

    let (_, body) = send(
        &app,
        "DELETE",
        &format!("/api/etcd/{}/kv?key=/app/&prefix=true", id),
        None,
    )
    .await;
    assert_eq!(body["deleted"], 1);

    let (_, body) = send(&app, "GET", &format!("/api/etcd/{}/health", id), None).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["health"][0]["health"], true);
}

#[tokio::test]
async fn test_etcd_routes_hide_inactive_clusters() {
    let cluster = FakeCluster::new();
    let app = test_app(&cluster).await;
    let id = register(&app, "paused").await;

    send(
        &app,
        "PUT",
        &format!("/api/clusters/{}", id),
        Some(json!({"is_active": false})),
    )
    .await;

    let (status, body) = send(&app, "GET", &format!("/api/etcd/{}/kv?key=/a", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(cluster.connections(), 0);

    let (status, _) = send(&app, "GET", "/api/etcd/999/keys", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_etcd_routes_read_credential_store() {
    let cluster = FakeCluster::new();
    cluster.insert("/app/mode", "green");
    let app = memory_app(&cluster, vec![(41, true), (42, false)]).await;

    let (status, body) = send(&app, "GET", "/api/etcd/41/kv?key=/app/mode", None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["value"], "green");
    assert_eq!(cluster.connections(), 1);

    let (status, _) = send(&app, "GET", "/api/etcd/42/kv?key=/app/mode", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/api/etcd/43/keys", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(cluster.connections(), 1);
}

#[tokio::test]
async fn test_etcd_malformed_key() {
    let cluster = FakeCluster::new();
    let app = test_app(&cluster).await;
    let id = register(&app, "prod").await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/etcd/{}/kv", id),
        Some(json!({"key": "", "value": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(cluster.connections(), 0);
}

#[tokio::test]
async fn test_etcd_missing_pod_is_not_found() {
    let cluster = FakeCluster::empty();
    let app = test_app(&cluster).await;
    let id = register(&app, "podless").await;

    let (status, body) = send(&app, "GET", &format!("/api/etcd/{}/keys", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("etcd pod not found"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(&FakeCluster::new()).await;

    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["probes"][0]["component"], "database");
    assert_eq!(body["probes"][1]["detail"], "0 clusters, 0 active");
}
