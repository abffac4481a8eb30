//! HTTPバッチ配送
//!
//! 配送単位をJSON配列としてPOSTする。2xx以外はログに残して失敗扱いにするが再送はしない。

use super::{Delivery, Sink};
use crate::config::BatchTarget;
use crate::error::SinkError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// 配送用HTTPクライアントを作成
///
/// 応答しない配送先でも `timeout` 後に配送枠を解放する。
pub fn delivery_client(timeout: Duration) -> Result<Client, SinkError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// HTTP POST配送先
pub struct HttpBatchSink {
    name: String,
    client: Client,
    target: BatchTarget,
}

impl HttpBatchSink {
    /// 新しい配送先を作成
    pub fn new(client: Client, target: BatchTarget) -> Self {
        Self {
            name: format!("http:{}", target.url),
            client,
            target,
        }
    }
}

#[async_trait]
impl Sink for HttpBatchSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<(), SinkError> {
        let body = serde_json::to_vec(delivery.samples())?;
        let size = body.len();

        let mut request = self
            .client
            .post(&self.target.url)
            .header("Content-Type", "application/json")
            .body(body);
        if let Some(credentials) = &self.target.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(
                sink = %self.name,
                count = delivery.len(),
                status = status.as_u16(),
                "Batch rejected"
            );
            return Err(SinkError::Status(status.as_u16()));
        }

        debug!(
            sink = %self.name,
            count = delivery.len(),
            size,
            status = status.as_u16(),
            "Batch recorded"
        );
        Ok(())
    }
}
