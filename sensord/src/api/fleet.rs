//! ワーカー一覧・メトリクス・ヘルスチェック

use super::ApiState;
use crate::registry::WorkerSummary;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// GET /checks
pub async fn list_checks(State(state): State<ApiState>) -> Json<Vec<WorkerSummary>> {
    Json(state.registry.list().await)
}

/// GET /metrics
pub async fn metrics(State(state): State<ApiState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Response {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "workers": state.registry.len().await,
    }))
    .into_response()
}
