//! 配送パイプライン
//!
//! 計測チャネルの消費側。ストリームモードではフォワーダがサンプルを1件ずつ、
//! バッチモードではバッチバッファがフラッシュ単位でディスパッチャに渡す。

pub mod buffer;
pub mod dispatcher;

pub use buffer::{BatchBuffer, DEFAULT_FLUSH_INTERVAL_MS};
pub use dispatcher::FanOutDispatcher;

use crate::channel::SampleReceiver;
use crate::config::DeliveryMode;
use crate::sink::Delivery;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// パイプラインの起動設定
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// 配送モード
    pub mode: DeliveryMode,
    /// 消費タスク数
    pub forwarder_count: usize,
    /// バッチのフラッシュ間隔
    pub flush_interval: Duration,
}

/// モードに応じて消費タスクを起動する
pub fn start(
    config: PipelineConfig,
    input: SampleReceiver,
    dispatcher: FanOutDispatcher,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    info!(
        mode = ?config.mode,
        forwarders = config.forwarder_count,
        lanes = dispatcher.lane_count(),
        "Starting delivery pipeline"
    );

    match config.mode {
        DeliveryMode::Stream => {
            spawn_forwarders(config.forwarder_count, input, dispatcher, cancel)
        }
        DeliveryMode::Batch => spawn_batchers(
            config.forwarder_count,
            config.flush_interval,
            input,
            dispatcher,
            cancel,
        ),
    }
}

/// サンプルを1件ずつ全レーンへ流すフォワーダを起動する
pub fn spawn_forwarders(
    count: usize,
    input: SampleReceiver,
    dispatcher: FanOutDispatcher,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|_| {
            let input = input.clone();
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        sample = input.recv() => match sample {
                            Some(sample) => dispatcher.dispatch(Delivery::from(sample)),
                            None => break,
                        },
                    }
                }
            })
        })
        .collect()
}

/// バッチバッファを起動する
///
/// バッファが複数ある場合、各バッファは独立にフラッシュする。
pub fn spawn_batchers(
    count: usize,
    flush_interval: Duration,
    input: SampleReceiver,
    dispatcher: FanOutDispatcher,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(BatchBuffer::new(flush_interval).run(
                input.clone(),
                move |batch| dispatcher.dispatch(Delivery::from(batch)),
                cancel.clone(),
            ))
        })
        .collect()
}
