//! マニフェスト取得
//!
//! リモート（http/https）またはローカル（file://）からチェック一覧を取得し、
//! 一定間隔でスナップショットを流す。取得・パースに失敗した周期は何も流さない。

use crate::error::ManifestError;
use crate::metrics::Metrics;
use crate::types::Manifest;
use reqwest::{Client, Url};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// デフォルトの取得間隔（秒）
pub const DEFAULT_MANIFEST_INTERVAL_SECS: u64 = 10;

/// HTTP取得のタイムアウト
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// マニフェストの取得元
#[derive(Clone)]
pub struct ManifestSource {
    client: Client,
    location: String,
}

impl ManifestSource {
    /// 取得元を作成
    pub fn new(client: Client, location: impl Into<String>) -> Self {
        Self {
            client,
            location: location.into(),
        }
    }

    /// 取得元の場所
    pub fn location(&self) -> &str {
        &self.location
    }

    /// マニフェストを1回取得してパースする
    pub async fn fetch(&self) -> Result<Manifest, ManifestError> {
        let url = Url::parse(&self.location)
            .map_err(|_| ManifestError::UnsupportedScheme(self.location.clone()))?;

        let body = match url.scheme() {
            "http" | "https" => {
                let response = self
                    .client
                    .get(url)
                    .timeout(FETCH_TIMEOUT)
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ManifestError::Status {
                        url: self.location.clone(),
                        status: status.as_u16(),
                    });
                }
                response.bytes().await?.to_vec()
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| ManifestError::UnsupportedScheme(self.location.clone()))?;
                tokio::fs::read(path).await?
            }
            _ => return Err(ManifestError::UnsupportedScheme(self.location.clone())),
        };

        let manifest = Manifest::from_json(&body)?;
        debug!(
            location = %self.location,
            checks = manifest.checks.len(),
            services = manifest.services.len(),
            "Manifest fetched"
        );
        Ok(manifest)
    }

    /// 取得ループ
    ///
    /// 起動直後に1回、その後 `interval` ごとに取得して `tx` に流す。
    /// 受信側が閉じるか `cancel` されたら終了する。
    pub async fn watch(
        self,
        tx: mpsc::Sender<Manifest>,
        interval: Duration,
        cancel: CancellationToken,
        metrics: Metrics,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(location = %self.location, interval_secs = interval.as_secs(), "Manifest watcher started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                fetched = self.fetch() => fetched,
            };

            match fetched {
                Ok(manifest) => {
                    metrics.record_manifest_refresh(true);
                    if tx.send(manifest).await.is_err() {
                        debug!("Manifest receiver closed");
                        break;
                    }
                }
                Err(e) => {
                    metrics.record_manifest_refresh(false);
                    warn!(location = %self.location, error = %e, "Manifest refresh failed, keeping current checks");
                }
            }
        }

        info!("Manifest watcher stopped");
    }
}
