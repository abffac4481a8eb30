//! GET /samples
//!
//! 接続ごとにフィードを購読し、サンプル1件を1行のJSONとして流し続ける。
//! クライアントが切断すると購読も破棄される。

use super::ApiState;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use crate::types::Sample;
use futures::{stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

type FeedReceiver = broadcast::Receiver<Arc<Sample>>;

/// NDJSONストリーム
pub async fn stream_samples(State(state): State<ApiState>) -> Response {
    let rx = state.feed.subscribe();
    debug!(subscribers = state.feed.subscriber_count(), "Feed client connected");

    let shutdown = state.shutdown.clone();
    let body = stream::unfold(rx, next_line).take_until(async move { shutdown.wait().await });
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body),
    )
        .into_response()
}

async fn next_line(mut rx: FeedReceiver) -> Option<(Result<String, Infallible>, FeedReceiver)> {
    loop {
        match rx.recv().await {
            Ok(sample) => match serde_json::to_string(sample.as_ref()) {
                Ok(mut line) => {
                    line.push('\n');
                    return Some((Ok(line), rx));
                }
                Err(e) => warn!(error = %e, "Failed to encode sample"),
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Feed client lagging, samples skipped");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}
