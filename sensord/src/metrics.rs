//! メトリクス収集
//!
//! レーンごとの配送試行・成功・破棄件数、稼働ワーカー数などをprometheus形式で保持する。
//! 正しさには関与しない観測用の値。

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// エージェントのメトリクス
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    lane_attempts: IntCounterVec,
    lane_successes: IntCounterVec,
    lane_dropped: IntCounterVec,
    active_workers: IntGauge,
    samples: IntCounter,
    manifest_refreshes: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// 新しいメトリクスレジストリを作成
    pub fn new() -> Self {
        let registry = Registry::new();

        let lane_attempts = counter_vec(
            &registry,
            "sensord_lane_attempts_total",
            "Deliveries attempted per lane",
            "lane",
        );
        let lane_successes = counter_vec(
            &registry,
            "sensord_lane_successes_total",
            "Deliveries accepted by the sink per lane",
            "lane",
        );
        let lane_dropped = counter_vec(
            &registry,
            "sensord_lane_dropped_total",
            "Deliveries dropped because the lane queue was full",
            "lane",
        );
        let manifest_refreshes = counter_vec(
            &registry,
            "sensord_manifest_refresh_total",
            "Manifest refresh attempts by result",
            "result",
        );

        let active_workers =
            IntGauge::new("sensord_active_workers", "Check workers currently tracked")
                .expect("valid gauge definition");
        registry
            .register(Box::new(active_workers.clone()))
            .expect("metric names are unique");

        let samples = IntCounter::new("sensord_samples_total", "Samples emitted by check workers")
            .expect("valid counter definition");
        registry
            .register(Box::new(samples.clone()))
            .expect("metric names are unique");

        Self {
            registry,
            lane_attempts,
            lane_successes,
            lane_dropped,
            active_workers,
            samples,
            manifest_refreshes,
        }
    }

    /// レーン用のカウンタを取得
    pub fn lane(&self, lane: &str) -> LaneMetrics {
        LaneMetrics {
            attempts: self.lane_attempts.with_label_values(&[lane]),
            successes: self.lane_successes.with_label_values(&[lane]),
            dropped: self.lane_dropped.with_label_values(&[lane]),
        }
    }

    /// 稼働ワーカー数ゲージ
    pub fn active_workers(&self) -> &IntGauge {
        &self.active_workers
    }

    /// 発行サンプル数カウンタ
    pub fn samples(&self) -> &IntCounter {
        &self.samples
    }

    /// マニフェスト取得結果を記録
    pub fn record_manifest_refresh(&self, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.manifest_refreshes.with_label_values(&[result]).inc();
    }

    /// テキスト形式でエンコード
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, label: &str) -> IntCounterVec {
    let vec = IntCounterVec::new(Opts::new(name, help), &[label]).expect("valid counter definition");
    registry
        .register(Box::new(vec.clone()))
        .expect("metric names are unique");
    vec
}

/// 1レーン分のカウンタ
#[derive(Clone)]
pub struct LaneMetrics {
    attempts: IntCounter,
    successes: IntCounter,
    dropped: IntCounter,
}

impl LaneMetrics {
    /// 配送試行を記録
    pub fn attempted(&self) {
        self.attempts.inc();
    }

    /// 配送成功を記録
    pub fn succeeded(&self) {
        self.successes.inc();
    }

    /// キュー溢れによる破棄を記録
    pub fn dropped(&self) {
        self.dropped.inc();
    }

    /// 試行件数
    pub fn attempts(&self) -> u64 {
        self.attempts.get()
    }

    /// 成功件数
    pub fn successes(&self) -> u64 {
        self.successes.get()
    }

    /// 破棄件数
    pub fn drops(&self) -> u64 {
        self.dropped.get()
    }
}
