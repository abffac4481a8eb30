//! ストリーミングフィード
//!
//! 接続中のクライアントへサンプルを配信するためのブロードキャスト基盤。
//! クライアントごとに購読し、遅れたクライアントは古いサンプルを取りこぼす。

use super::{Delivery, Sink};
use crate::error::SinkError;
use crate::types::Sample;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// フィードのチャネル容量
const FEED_CHANNEL_CAPACITY: usize = 1024;

/// サンプルフィード
///
/// 購読者がいない間のサンプルは破棄される。
#[derive(Clone)]
pub struct SampleFeed {
    sender: broadcast::Sender<Arc<Sample>>,
}

impl Default for SampleFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleFeed {
    /// 新しいフィードを作成
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// フィードを購読
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Sample>> {
        self.sender.subscribe()
    }

    /// サンプルを発行
    ///
    /// 購読者がいない場合でもエラーにはならない
    pub fn publish(&self, sample: Arc<Sample>) {
        let _ = self.sender.send(sample);
    }

    /// 現在の購読者数を取得
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// フィードへの配送レーン
pub struct FeedSink {
    feed: SampleFeed,
}

impl FeedSink {
    /// フィードに書き込む配送先を作成
    pub fn new(feed: SampleFeed) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl Sink for FeedSink {
    fn name(&self) -> &str {
        "feed"
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<(), SinkError> {
        match delivery {
            Delivery::Sample(sample) => self.feed.publish(sample.clone()),
            Delivery::Batch(batch) => {
                for sample in batch.iter() {
                    self.feed.publish(Arc::new(sample.clone()));
                }
            }
        }
        Ok(())
    }
}
