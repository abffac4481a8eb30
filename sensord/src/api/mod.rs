//! HTTP API
//!
//! フィードリスナー上で公開するルート。
//!
//! - `GET /samples`: サンプルをNDJSONでストリーミング（認証情報があればBasic認証）
//! - `GET /checks`: 稼働中ワーカー一覧
//! - `GET /metrics`: Prometheusメトリクス
//! - `GET /health`: ヘルスチェック

pub mod auth;
pub mod fleet;
pub mod samples;

use crate::config::Credentials;
use crate::metrics::Metrics;
use crate::registry::FleetRegistry;
use crate::shutdown::ShutdownController;
use crate::sink::SampleFeed;
use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

/// APIハンドラーで共有する状態
#[derive(Clone)]
pub struct ApiState {
    /// サンプルフィード
    pub feed: SampleFeed,
    /// ワーカーレジストリ
    pub registry: FleetRegistry,
    /// メトリクス
    pub metrics: Metrics,
    /// フィードのBasic認証情報
    pub credentials: Option<Credentials>,
    /// シャットダウン時に配信中のストリームを閉じる
    pub shutdown: ShutdownController,
}

/// ルーターを構築
pub fn create_app(state: ApiState) -> Router {
    let feed_routes = Router::new()
        .route("/samples", get(samples::stream_samples))
        .route_layer(middleware::from_fn_with_state(
            state.credentials.clone(),
            auth::basic_auth_middleware,
        ));

    Router::new()
        .merge(feed_routes)
        .route("/checks", get(fleet::list_checks))
        .route("/metrics", get(fleet::metrics))
        .route("/health", get(fleet::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
