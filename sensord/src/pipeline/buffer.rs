//! バッチバッファ
//!
//! 計測チャネルから届いたサンプルをメモリ上に溜め、フラッシュ間隔ごとに
//! 新しい空のバッファと入れ替えて、溜まった分を配送に渡す。
//! 配送の完了は待たないため、フラッシュ中も取り込みは止まらない。
//! 空のバッファはフラッシュしない。

use crate::channel::SampleReceiver;
use crate::types::Sample;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// デフォルトのフラッシュ間隔（ミリ秒）
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1000;

/// バッファの初期容量
const INITIAL_CAPACITY: usize = 100;

/// バッチバッファ
pub struct BatchBuffer {
    flush_interval: Duration,
}

impl BatchBuffer {
    /// フラッシュ間隔を指定して作成
    pub fn new(flush_interval: Duration) -> Self {
        Self { flush_interval }
    }

    /// 取り込みとフラッシュのループ
    ///
    /// `flush` はバッチを受け取ってすぐに戻ること（配送は別タスクで行う）。
    /// 入力が閉じたら残りをフラッシュして終了する。
    pub async fn run<F>(self, input: SampleReceiver, mut flush: F, cancel: CancellationToken)
    where
        F: FnMut(Vec<Sample>) + Send,
    {
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut batch = Vec::with_capacity(INITIAL_CAPACITY);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    debug!(batch_size = batch.len(), "Flush window elapsed");
                    if !batch.is_empty() {
                        flush(std::mem::replace(&mut batch, Vec::with_capacity(INITIAL_CAPACITY)));
                    }
                }
                sample = input.recv() => match sample {
                    Some(sample) => batch.push(sample),
                    None => {
                        if !batch.is_empty() {
                            flush(std::mem::take(&mut batch));
                        }
                        break;
                    }
                },
            }
        }
    }
}
