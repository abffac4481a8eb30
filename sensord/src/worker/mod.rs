//! チェックワーカー
//!
//! 1つのチェックのサンプリングループを所有する。
//!
//! 状態遷移: `Idle → Running → Stopping → Stopped`
//!
//! 停止要求は `CancellationToken` で伝える。tick待ち・プローブ実行・
//! チャネルへの送信のいずれもトークンと競合させるため、送信待ちで
//! ブロックしている最中の停止要求も即座に反映される。その場合、
//! 送信中だったサンプルは破棄される。

use crate::channel::SampleSender;
use crate::metrics::Metrics;
use crate::probe::ProbeExecutor;
use crate::shutdown::ShutdownController;
use crate::types::{Check, Sample};
use chrono::Utc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// デフォルトのサンプリング間隔（ミリ秒）
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1000;

/// ワーカー状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// 作成直後
    Idle = 0,
    /// サンプリング中
    Running = 1,
    /// 停止要求済み（ループ終了待ち）
    Stopping = 2,
    /// 終了
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    /// 文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

/// 全ワーカーで共有する実行環境
#[derive(Clone)]
pub struct WorkerContext {
    /// プローブ実行器
    pub probe: Arc<dyn ProbeExecutor>,
    /// 計測チャネル送信側
    pub output: SampleSender,
    /// サンプルに付与するロケーション
    pub location: String,
    /// サンプリング間隔
    pub interval: Duration,
    /// 致命的失敗の通知先
    pub shutdown: ShutdownController,
    /// メトリクス
    pub metrics: Metrics,
}

/// ワーカーの状態観測・停止用ハンドル
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl WorkerHandle {
    /// 現在の状態
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// 停止要求を受け取ったか
    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// チェックワーカー
pub struct CheckWorker {
    check: Check,
    ctx: WorkerContext,
    handle: WorkerHandle,
}

impl CheckWorker {
    /// 新しいワーカーを作成（`Idle`）
    ///
    /// `cancel` には親トークンの子を渡す。親がキャンセルされると全ワーカーが止まる。
    pub fn new(check: Check, ctx: WorkerContext, cancel: CancellationToken) -> Self {
        Self {
            check,
            ctx,
            handle: WorkerHandle {
                state: Arc::new(AtomicU8::new(WorkerState::Idle as u8)),
                cancel,
            },
        }
    }

    /// 担当チェック
    pub fn check(&self) -> &Check {
        &self.check
    }

    /// 現在の状態
    pub fn state(&self) -> WorkerState {
        self.handle.state()
    }

    /// 観測用ハンドル
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// サンプリングループを開始
    ///
    /// `Idle` 以外の状態では何もしない。
    pub fn start(&self) {
        if self
            .handle
            .state
            .compare_exchange(
                WorkerState::Idle as u8,
                WorkerState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        let check = self.check.clone();
        let ctx = self.ctx.clone();
        let handle = self.handle.clone();
        tokio::spawn(run(check, ctx, handle));
    }

    /// 停止を要求（ループの終了は待たない）
    pub fn stop(&self) {
        let state = &self.handle.state;
        if state
            .compare_exchange(
                WorkerState::Running as u8,
                WorkerState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            // 未開始のワーカーはそのまま終了扱い
            let _ = state.compare_exchange(
                WorkerState::Idle as u8,
                WorkerState::Stopped as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
        self.handle.cancel.cancel();
    }
}

/// サンプリングループ
async fn run(check: Check, ctx: WorkerContext, handle: WorkerHandle) {
    let cancel = handle.cancel.clone();
    let mut ticker = interval(ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(check_id = %check.id, url = %check.url, "Check worker started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let t = Utc::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = ctx.probe.measure(&check.url) => result,
        };

        let measurement = match result {
            Ok(measurement) => measurement,
            Err(e) => {
                error!(check_id = %check.id, error = %e, "Probe failed fatally");
                ctx.shutdown
                    .fatal(format!("check {} cannot be probed: {}", check.id, e));
                break;
            }
        };

        let sample = Sample::new(&check, &ctx.location, t, measurement);
        debug!(
            check_id = %check.id,
            exit_status = sample.measurement.exit_status,
            http_status = sample.measurement.http_status,
            total_time = sample.measurement.total_time,
            "Sample taken"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(check_id = %check.id, "Stop requested while emitting, dropping in-flight sample");
                break;
            }
            sent = ctx.output.send(sample) => {
                if sent.is_err() {
                    warn!(check_id = %check.id, "Measurement channel closed");
                    break;
                }
                ctx.metrics.samples().inc();
            }
        }
    }

    handle
        .state
        .store(WorkerState::Stopped as u8, Ordering::SeqCst);
    info!(check_id = %check.id, "Check worker stopped");
}
