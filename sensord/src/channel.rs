//! 計測チャネル
//!
//! 全チェックワーカーから配送パイプライン初段への受け渡し口。
//! 多プロデューサー・多コンシューマー。準備のできたコンシューマーが先に受け取る。
//!
//! tokioの `mpsc` は容量0を持てないため容量1で生成する。
//! 受け手が詰まると送信側（ワーカー）が待たされ、サンプリング頻度が落ちる。

use crate::types::Sample;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// チャネル容量
pub const CHANNEL_CAPACITY: usize = 1;

/// 送信側ハンドル（ワーカーごとにクローンする）
pub type SampleSender = mpsc::Sender<Sample>;

/// 受信側ハンドル
///
/// クローンして複数のコンシューマーで共有できる。
#[derive(Clone)]
pub struct SampleReceiver {
    inner: Arc<Mutex<mpsc::Receiver<Sample>>>,
}

impl SampleReceiver {
    /// 次のサンプルを待つ
    ///
    /// すべての送信側がドロップされると `None` を返す。
    pub async fn recv(&self) -> Option<Sample> {
        self.inner.lock().await.recv().await
    }
}

/// 計測チャネルを作成
pub fn measurement_channel() -> (SampleSender, SampleReceiver) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        tx,
        SampleReceiver {
            inner: Arc::new(Mutex::new(rx)),
        },
    )
}
