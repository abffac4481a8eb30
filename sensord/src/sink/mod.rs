//! 配送先アダプタ
//!
//! 各配送先の符号化と転送方式を隠蔽する。ファンアウトディスパッチャからは
//! 不透明な配送レーンとして扱われる。配送はベストエフォートで、
//! 再送・永続化は行わない。

pub mod feed;
pub mod http;
pub mod logfmt;
pub mod udp;

pub use feed::{FeedSink, SampleFeed};
pub use http::{delivery_client, HttpBatchSink};
pub use logfmt::LogfmtSink;
pub use udp::UdpSink;

use crate::error::SinkError;
use crate::types::Sample;
use async_trait::async_trait;
use std::sync::Arc;

/// 配送単位
///
/// 全レーンで同じデータを共有するため `Arc` で保持する。
#[derive(Debug, Clone)]
pub enum Delivery {
    /// サンプル1件
    Sample(Arc<Sample>),
    /// フラッシュ間隔分のバッチ
    Batch(Arc<[Sample]>),
}

impl Delivery {
    /// 含まれるサンプル
    pub fn samples(&self) -> &[Sample] {
        match self {
            Self::Sample(sample) => std::slice::from_ref(sample.as_ref()),
            Self::Batch(batch) => &batch[..],
        }
    }

    /// サンプル件数
    pub fn len(&self) -> usize {
        self.samples().len()
    }

    /// 空か
    pub fn is_empty(&self) -> bool {
        self.samples().is_empty()
    }
}

impl From<Sample> for Delivery {
    fn from(sample: Sample) -> Self {
        Self::Sample(Arc::new(sample))
    }
}

impl From<Vec<Sample>> for Delivery {
    fn from(batch: Vec<Sample>) -> Self {
        Self::Batch(batch.into())
    }
}

/// 配送先アダプタ
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// レーン名（ログ・メトリクスのラベル）
    fn name(&self) -> &str;

    /// 配送を1回試みる
    async fn deliver(&self, delivery: &Delivery) -> Result<(), SinkError>;
}
