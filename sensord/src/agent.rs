//! エージェント本体
//!
//! 配送パイプライン・ワーカーレジストリ・サービスルーター・マニフェスト監視を
//! 組み立てて起動する。マニフェストのスナップショットは1件ずつ順に適用する。

use crate::api::ApiState;
use crate::channel::measurement_channel;
use crate::config::AgentConfig;
use crate::error::{SensordError, SensordResult};
use crate::manifest::ManifestSource;
use crate::metrics::Metrics;
use crate::pipeline::{self, FanOutDispatcher, PipelineConfig};
use crate::probe::{HttpProbe, ProbeExecutor};
use crate::registry::FleetRegistry;
use crate::router::ServiceRouter;
use crate::server;
use crate::shutdown::ShutdownController;
use crate::sink::{
    delivery_client, FeedSink, HttpBatchSink, LogfmtSink, SampleFeed, Sink, UdpSink,
};
use crate::types::Manifest;
use crate::worker::WorkerContext;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 起動済みエージェント
pub struct Agent {
    registry: FleetRegistry,
    router: Arc<ServiceRouter>,
    feed: SampleFeed,
    metrics: Metrics,
    shutdown: ShutdownController,
    root: CancellationToken,
    feed_addr: Option<SocketAddr>,
    server: Option<JoinHandle<SensordResult<()>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Agent {
    /// HTTPプローブでエージェントを起動
    pub async fn start(config: AgentConfig, shutdown: ShutdownController) -> SensordResult<Self> {
        let probe = HttpProbe::new(config.probe_timeout)?;
        Self::start_with_probe(config, shutdown, Arc::new(probe)).await
    }

    /// 任意のプローブ実行器でエージェントを起動
    pub async fn start_with_probe(
        config: AgentConfig,
        shutdown: ShutdownController,
        probe: Arc<dyn ProbeExecutor>,
    ) -> SensordResult<Self> {
        config.validate()?;

        let metrics = Metrics::new();
        let root = CancellationToken::new();
        let client = delivery_client(config.delivery_timeout)?;
        let feed = SampleFeed::new();
        let router = Arc::new(ServiceRouter::new(
            client.clone(),
            config.lane,
            metrics.clone(),
            root.child_token(),
        ));

        // 配送先
        let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
        for target in &config.batch_targets {
            sinks.push(Arc::new(HttpBatchSink::new(client.clone(), target.clone())));
        }
        for addr in &config.udp_addrs {
            sinks.push(Arc::new(UdpSink::bind(addr.clone()).await?));
        }
        if config.logfmt {
            sinks.push(Arc::new(LogfmtSink::stdout()));
        }
        if config.feed.is_some() {
            sinks.push(Arc::new(FeedSink::new(feed.clone())));
        }
        // レーンは起動時に固定。サービスが宣言されるまでルーターは何もしない
        sinks.push(router.clone());

        let mut tasks = Vec::new();
        let (dispatcher, lane_tasks) =
            FanOutDispatcher::spawn(sinks, config.lane, &metrics, root.child_token());
        tasks.extend(lane_tasks);

        let (tx, rx) = measurement_channel();
        tasks.extend(pipeline::start(
            PipelineConfig {
                mode: config.mode,
                forwarder_count: config.forwarder_count,
                flush_interval: config.flush_interval,
            },
            rx,
            dispatcher,
            root.child_token(),
        ));

        let registry = FleetRegistry::new(
            WorkerContext {
                probe,
                output: tx,
                location: config.location.clone(),
                interval: config.sample_interval,
                shutdown: shutdown.clone(),
                metrics: metrics.clone(),
            },
            root.child_token(),
        );

        // フィードのバインド失敗は起動失敗
        let (feed_addr, server) = match &config.feed {
            Some(feed_config) => {
                let listener = server::bind(&feed_config.bind_addr).await?;
                let addr = listener.local_addr().ok();
                let state = ApiState {
                    feed: feed.clone(),
                    registry: registry.clone(),
                    metrics: metrics.clone(),
                    credentials: feed_config.credentials.clone(),
                    shutdown: shutdown.clone(),
                };
                let handle = tokio::spawn(server::run(listener, state, shutdown.clone()));
                (addr, Some(handle))
            }
            None => (None, None),
        };

        let (manifest_tx, manifest_rx) = mpsc::channel(1);
        let source = ManifestSource::new(client, config.manifest_url.clone());
        tasks.push(tokio::spawn(source.watch(
            manifest_tx,
            config.manifest_interval,
            root.child_token(),
            metrics.clone(),
        )));
        tasks.push(tokio::spawn(apply_snapshots(
            manifest_rx,
            registry.clone(),
            router.clone(),
            root.child_token(),
        )));

        info!(
            manifest = %config.manifest_url,
            location = %config.location,
            mode = ?config.mode,
            "Agent started"
        );

        Ok(Self {
            registry,
            router,
            feed,
            metrics,
            shutdown,
            root,
            feed_addr,
            server,
            tasks,
        })
    }

    /// ワーカーレジストリ
    pub fn registry(&self) -> &FleetRegistry {
        &self.registry
    }

    /// サービスルーター
    pub fn router(&self) -> &ServiceRouter {
        &self.router
    }

    /// サンプルフィード
    pub fn feed(&self) -> &SampleFeed {
        &self.feed
    }

    /// メトリクス
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// フィードリスナーの実アドレス
    pub fn feed_addr(&self) -> Option<SocketAddr> {
        self.feed_addr
    }

    /// シグナルかシャットダウン要求まで動かし、その後停止する
    pub async fn run_until_shutdown(self) -> SensordResult<()> {
        server::shutdown_signal(self.shutdown.clone()).await;
        self.stop().await
    }

    /// 全タスクを停止する
    ///
    /// 配送中のサンプルは破棄される。ワーカーが致命的失敗を報告していた場合はエラーを返す。
    pub async fn stop(self) -> SensordResult<()> {
        self.shutdown.request_shutdown();
        self.registry.stop_all().await;
        self.root.cancel();

        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Agent task ended abnormally");
            }
        }
        if let Some(server) = self.server {
            match server.await {
                Ok(result) => result?,
                Err(e) => warn!(error = %e, "Feed server task ended abnormally"),
            }
        }

        info!("Agent stopped");
        match self.shutdown.fatal_reason() {
            Some(reason) => Err(SensordError::Fatal(reason)),
            None => Ok(()),
        }
    }
}

/// マニフェストのスナップショットを順に適用する
async fn apply_snapshots(
    mut rx: mpsc::Receiver<Manifest>,
    registry: FleetRegistry,
    router: Arc<ServiceRouter>,
    cancel: CancellationToken,
) {
    loop {
        let manifest = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            manifest = rx.recv() => match manifest {
                Some(manifest) => manifest,
                None => break,
            },
        };

        router.update(&manifest).await;
        registry.reconcile(&manifest).await;
    }
}
