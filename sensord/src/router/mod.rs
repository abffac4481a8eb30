//! サービスルーティング
//!
//! マニフェストで宣言された名前付きサービスへ、チェックごとにサンプルを振り分ける。
//! ルーター自身は1本の配送レーンとしてディスパッチャに登録され、その内側で
//! サービスごとに独立したキューと配送タスクを持つ。ルーターはサービスを待たない。
//! 削除済みチェックのサンプルや未定義サービスへの参照は読み飛ばす。

use crate::config::{BatchTarget, LaneConfig};
use crate::error::SinkError;
use crate::metrics::Metrics;
use crate::pipeline::dispatcher::Lane;
use crate::sink::{Delivery, HttpBatchSink, LogfmtSink, Sink, UdpSink};
use crate::types::{Manifest, Sample, ServiceKind};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 登録済みサービス
///
/// 破棄されるとサービスの配送タスクも止まる。
struct Service {
    kind: ServiceKind,
    lane: Lane,
    cancel: CancellationToken,
}

impl Drop for Service {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Default)]
struct RouteTable {
    /// チェックID → サービスID一覧
    checks: HashMap<String, Vec<String>>,
    /// サービスID → サービス
    services: HashMap<String, Service>,
}

/// サービスルーター
pub struct ServiceRouter {
    client: Client,
    lane: LaneConfig,
    metrics: Metrics,
    cancel: CancellationToken,
    table: RwLock<RouteTable>,
}

impl ServiceRouter {
    /// 空のルーターを作成
    ///
    /// サービスの配送タスクは `cancel` の子トークンで動く。
    pub fn new(
        client: Client,
        lane: LaneConfig,
        metrics: Metrics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            lane,
            metrics,
            cancel,
            table: RwLock::new(RouteTable::default()),
        }
    }

    /// サービスを登録（同じIDは置き換え）
    pub async fn register(&self, id: impl Into<String>, kind: ServiceKind, sink: Arc<dyn Sink>) {
        let id = id.into();
        debug!(service_id = %id, sink = %sink.name(), "Service registered");
        let service = self.spawn_service(&id, kind, sink);
        self.table.write().await.services.insert(id, service);
    }

    fn spawn_service(&self, id: &str, kind: ServiceKind, sink: Arc<dyn Sink>) -> Service {
        let cancel = self.cancel.child_token();
        // タスクはトークンで止めるのでハンドルは保持しない
        let (lane, _task) = Lane::spawn(
            format!("service:{id}"),
            sink,
            self.lane,
            &self.metrics,
            cancel.clone(),
        );
        Service { kind, lane, cancel }
    }

    /// マニフェストからルーティング表を更新する
    ///
    /// チェック表は丸ごと置き換える。サービスはIDで追加・削除し、
    /// 種別や設定が変わったものだけ作り直す。作成に失敗したサービスは登録しない。
    pub async fn update(&self, manifest: &Manifest) {
        let current: HashMap<String, ServiceKind> = {
            let table = self.table.read().await;
            table
                .services
                .iter()
                .map(|(id, svc)| (id.clone(), svc.kind.clone()))
                .collect()
        };

        let mut built = Vec::new();
        for def in &manifest.services {
            if current.get(&def.id) == Some(&def.kind) {
                continue;
            }
            match self.build(&def.kind).await {
                Ok(sink) => built.push((
                    def.id.clone(),
                    self.spawn_service(&def.id, def.kind.clone(), sink),
                )),
                Err(e) => warn!(service_id = %def.id, error = %e, "Failed to build service"),
            }
        }

        let mut table = self.table.write().await;
        table.checks = manifest
            .checks
            .iter()
            .filter(|c| !c.services.is_empty())
            .map(|c| (c.id.clone(), c.services.clone()))
            .collect();

        let before = table.services.len();
        table
            .services
            .retain(|id, _| manifest.services.iter().any(|def| &def.id == id));
        let removed = before - table.services.len();
        let added = built.len();
        for (id, service) in built {
            table.services.insert(id, service);
        }

        if added > 0 || removed > 0 {
            info!(
                added,
                removed,
                services = table.services.len(),
                routed_checks = table.checks.len(),
                "Service routes updated"
            );
        }
    }

    /// 登録済みサービスID（ソート済み）
    pub async fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.table.read().await.services.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn build(&self, kind: &ServiceKind) -> Result<Arc<dyn Sink>, SinkError> {
        let sink: Arc<dyn Sink> = match kind {
            ServiceKind::Logfmt => Arc::new(LogfmtSink::stdout()),
            ServiceKind::Http { url } => {
                let target = BatchTarget::parse(url)?;
                Arc::new(HttpBatchSink::new(self.client.clone(), target))
            }
            ServiceKind::Udp { addr } => Arc::new(UdpSink::bind(addr.clone()).await?),
        };
        Ok(sink)
    }

    /// サンプルをサービスごとにまとめる
    async fn route(&self, samples: &[Sample]) -> Vec<(Lane, Vec<Sample>)> {
        let table = self.table.read().await;
        if table.checks.is_empty() {
            return Vec::new();
        }
        let mut grouped: BTreeMap<&str, (Lane, Vec<Sample>)> = BTreeMap::new();

        for sample in samples {
            let Some(service_ids) = table.checks.get(&sample.check_id) else {
                debug!(check_id = %sample.check_id, "No routes for check, skipping sample");
                continue;
            };
            for service_id in service_ids {
                match table.services.get(service_id) {
                    Some(service) => grouped
                        .entry(service_id.as_str())
                        .or_insert_with(|| (service.lane.clone(), Vec::new()))
                        .1
                        .push(sample.clone()),
                    None => debug!(
                        check_id = %sample.check_id,
                        service_id = %service_id,
                        "Unknown service, skipping"
                    ),
                }
            }
        }

        grouped.into_values().collect()
    }
}

#[async_trait]
impl Sink for ServiceRouter {
    fn name(&self) -> &str {
        "services"
    }

    /// サービスごとのキューに書き込むだけで、配送完了は待たない
    async fn deliver(&self, delivery: &Delivery) -> Result<(), SinkError> {
        for (lane, samples) in self.route(delivery.samples()).await {
            match delivery {
                Delivery::Sample(_) => {
                    for sample in samples {
                        lane.offer(Delivery::from(sample));
                    }
                }
                Delivery::Batch(_) => lane.offer(Delivery::from(samples)),
            }
        }
        Ok(())
    }
}
