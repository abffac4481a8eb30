//! ファンアウトディスパッチャ
//!
//! 配送先ごとに独立したレーン（キュー＋タスク）を持ち、届いた配送単位を
//! すべてのレーンに書き込む。ディスパッチャ自身はレーンを待たない。
//! レーンのキューが満杯なら、そのレーン分だけ破棄して計上する。

use crate::config::LaneConfig;
use crate::metrics::{LaneMetrics, Metrics};
use crate::sink::{Delivery, Sink};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// レーンへの書き込み口
///
/// 配送先1つ分のキューと配送タスク。ディスパッチャとサービスルーターが共有する。
#[derive(Clone)]
pub(crate) struct Lane {
    name: String,
    tx: mpsc::Sender<Delivery>,
    metrics: LaneMetrics,
}

impl Lane {
    /// キューと配送タスクを起動する
    pub(crate) fn spawn(
        name: impl Into<String>,
        sink: Arc<dyn Sink>,
        config: LaneConfig,
        metrics: &Metrics,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let name = name.into();
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let lane_metrics = metrics.lane(&name);

        let handle = tokio::spawn(run_lane(
            sink,
            rx,
            lane_metrics.clone(),
            config.concurrency,
            cancel,
        ));
        info!(lane = %name, queue = config.queue_capacity, concurrency = config.concurrency, "Delivery lane started");

        (
            Self {
                name,
                tx,
                metrics: lane_metrics,
            },
            handle,
        )
    }

    /// キューに書き込む（待たない）。満杯なら破棄して計上する
    pub(crate) fn offer(&self, delivery: Delivery) {
        match self.tx.try_send(delivery) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                self.metrics.dropped();
                warn!(lane = %self.name, count = dropped.len(), "Lane queue full, dropping delivery");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(lane = %self.name, "Lane closed");
            }
        }
    }

    /// レーン名
    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

/// ファンアウトディスパッチャ
#[derive(Clone)]
pub struct FanOutDispatcher {
    lanes: Arc<[Lane]>,
}

impl FanOutDispatcher {
    /// 配送先ごとにレーンを起動する
    ///
    /// 戻り値の `JoinHandle` はレーンタスク。`cancel` で全レーンが止まる。
    pub fn spawn(
        sinks: Vec<Arc<dyn Sink>>,
        config: LaneConfig,
        metrics: &Metrics,
        cancel: CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (lanes, handles): (Vec<_>, Vec<_>) = sinks
            .into_iter()
            .map(|sink| {
                let name = sink.name().to_string();
                Lane::spawn(name, sink, config, metrics, cancel.clone())
            })
            .unzip();

        (
            Self {
                lanes: lanes.into(),
            },
            handles,
        )
    }

    /// 配送単位を全レーンに書き込む（待たない）
    pub fn dispatch(&self, delivery: Delivery) {
        for lane in self.lanes.iter() {
            lane.offer(delivery.clone());
        }
    }

    /// レーン名一覧
    pub fn lane_names(&self) -> Vec<&str> {
        self.lanes.iter().map(Lane::name).collect()
    }

    /// レーン数
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }
}

/// レーンの配送ループ
///
/// 同時に `concurrency` 件まで配送するため、配送完了順は到着順と一致しない。
async fn run_lane(
    sink: Arc<dyn Sink>,
    mut rx: mpsc::Receiver<Delivery>,
    metrics: LaneMetrics,
    concurrency: usize,
    cancel: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(concurrency));

    loop {
        let delivery = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            delivery = rx.recv() => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let sink = sink.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            metrics.attempted();
            match sink.deliver(&delivery).await {
                Ok(()) => metrics.succeeded(),
                Err(e) => warn!(
                    lane = %sink.name(),
                    count = delivery.len(),
                    error = %e,
                    "Delivery failed"
                ),
            }
            drop(permit);
        });
    }

    debug!(lane = %sink.name(), "Delivery lane stopped");
}
