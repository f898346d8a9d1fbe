//! HTTP routes
//!
//! Successful responses are the payload's fields plus `"success": true`;
//! failures are rendered by [`ApiError`](crate::error::ApiError).

pub mod clusters;
pub mod etcd;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::health::{HealthReport, ProbeStatus};
use crate::state::AppState;

/// Header carrying the acting user's id
pub const USER_ID_HEADER: &str = "x-user-id";

/// `{"success": true, ...payload}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// Acting user id, if the caller supplied one
pub fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

/// Build the full application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .merge(clusters::routes())
        .merge(etcd::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// 503 only when a probe is unhealthy; degraded still serves traffic
async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthReport>) {
    let probes = vec![
        state.health.database(&state.database).await,
        state.health.registry(&state.database).await,
        state.health.encryption(state.vault().key_source()),
    ];

    let report = state.health.report(probes);
    let code = if report.status == ProbeStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (code, Json(report))
}
