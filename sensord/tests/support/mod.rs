//! テスト共通のフェイク実装

#![allow(dead_code)]

use async_trait::async_trait;
use sensord::channel::{measurement_channel, SampleReceiver};
use sensord::error::{ProbeError, SinkError};
use sensord::metrics::Metrics;
use sensord::probe::ProbeExecutor;
use sensord::registry::FleetRegistry;
use sensord::shutdown::ShutdownController;
use sensord::sink::{Delivery, Sink};
use sensord::types::{Check, Manifest, Measurement, Sample};
use sensord::worker::WorkerContext;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 呼び出し順に増える `size_download` を返すプローブ
#[derive(Default)]
pub struct FakeProbe {
    calls: AtomicU64,
}

impl FakeProbe {
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbeExecutor for FakeProbe {
    async fn measure(&self, _url: &str) -> Result<Measurement, ProbeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Measurement {
            http_status: 200,
            size_download: n,
            total_time: 0.01,
            ..Measurement::default()
        })
    }
}

/// 受け取ったサンプルを記録する配送先
pub struct RecordingSink {
    name: String,
    samples: Mutex<Vec<Sample>>,
}

impl RecordingSink {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            samples: Mutex::new(Vec::new()),
        })
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().unwrap().len()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<(), SinkError> {
        self.samples
            .lock()
            .unwrap()
            .extend(delivery.samples().iter().cloned());
        Ok(())
    }
}

/// 常に失敗する配送先
pub struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn deliver(&self, _delivery: &Delivery) -> Result<(), SinkError> {
        Err(SinkError::Status(503))
    }
}

/// 配送が完了しない配送先
pub struct StalledSink;

#[async_trait]
impl Sink for StalledSink {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn deliver(&self, _delivery: &Delivery) -> Result<(), SinkError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// テスト用レジストリと計測チャネルの受信側
pub fn fleet(probe: Arc<dyn ProbeExecutor>, interval: Duration) -> (FleetRegistry, SampleReceiver) {
    let (tx, rx) = measurement_channel();
    let ctx = WorkerContext {
        probe,
        output: tx,
        location: "test".to_string(),
        interval,
        shutdown: ShutdownController::default(),
        metrics: Metrics::new(),
    };
    (FleetRegistry::new(ctx, CancellationToken::new()), rx)
}

/// (id, url) の組からマニフェストを作成
pub fn manifest(checks: &[(&str, &str)]) -> Manifest {
    Manifest::from_checks(
        checks
            .iter()
            .map(|(id, url)| Check::new(*id, *url))
            .collect(),
    )
}

/// 条件が満たされるまで待つ
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met before timeout");
}
