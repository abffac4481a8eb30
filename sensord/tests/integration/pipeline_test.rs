//! 配送パイプライン

use crate::support::{fleet, manifest, wait_until, FailingSink, FakeProbe, RecordingSink, StalledSink};
use chrono::Utc;
use sensord::channel::measurement_channel;
use sensord::config::{DeliveryMode, LaneConfig};
use sensord::metrics::Metrics;
use sensord::pipeline::{self, FanOutDispatcher, PipelineConfig};
use sensord::sink::{Delivery, Sink};
use sensord::types::{Check, Measurement, Sample};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn sample(check_id: &str) -> Sample {
    Sample::new(
        &Check::new(check_id, "http://x"),
        "test",
        Utc::now(),
        Measurement::default(),
    )
}

/// 失敗し続ける配送先があっても、成功する配送先には全件届く
#[tokio::test]
async fn test_failing_lane_does_not_affect_sibling() {
    let metrics = Metrics::new();
    let recording = RecordingSink::new("recording");
    let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(FailingSink), recording.clone()];
    let cancel = CancellationToken::new();
    let (dispatcher, _lanes) =
        FanOutDispatcher::spawn(sinks, LaneConfig::default(), &metrics, cancel.clone());

    for i in 0..50 {
        dispatcher.dispatch(Delivery::from(sample(&format!("c{i}"))));
    }

    wait_until(Duration::from_secs(5), || async { recording.len() == 50 }).await;
    wait_until(Duration::from_secs(5), || async {
        metrics.lane("failing").attempts() == 50
    })
    .await;
    wait_until(Duration::from_secs(5), || async {
        metrics.lane("recording").successes() == 50
    })
    .await;
    assert_eq!(metrics.lane("failing").successes(), 0);
    cancel.cancel();
}

/// 応答しない配送先はそのレーンだけを詰まらせる
#[tokio::test]
async fn test_stalled_lane_is_isolated() {
    let metrics = Metrics::new();
    let recording = RecordingSink::new("recording");
    let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(StalledSink), recording.clone()];
    let cancel = CancellationToken::new();
    let config = LaneConfig {
        queue_capacity: 16,
        concurrency: 1,
    };
    let (dispatcher, _lanes) = FanOutDispatcher::spawn(sinks, config, &metrics, cancel.clone());

    for i in 0..100 {
        dispatcher.dispatch(Delivery::from(sample(&format!("c{i}"))));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    wait_until(Duration::from_secs(5), || async { recording.len() == 100 }).await;
    assert!(metrics.lane("stalled").drops() > 0);
    cancel.cancel();
}

/// 1チェックのサンプルは計測順にチャネルへ出る
#[tokio::test]
async fn test_per_check_samples_are_ordered() {
    let (registry, rx) = fleet(Arc::new(FakeProbe::default()), Duration::from_millis(5));
    registry.reconcile(&manifest(&[("a", "http://x")])).await;

    let mut previous = None;
    for _ in 0..20 {
        let sample = rx.recv().await.unwrap();
        assert_eq!(sample.check_id, "a");
        let n = sample.measurement.size_download;
        if let Some(prev) = previous {
            assert!(n > prev, "sample {n} arrived after {prev}");
        }
        previous = Some(n);
    }

    registry.stop_all().await;
}

/// バッチモードでは複数チェックのサンプルがまとめて届く
#[tokio::test]
async fn test_batch_mode_end_to_end() {
    let metrics = Metrics::new();
    let recording = RecordingSink::new("recording");
    let sinks: Vec<Arc<dyn Sink>> = vec![recording.clone()];
    let cancel = CancellationToken::new();
    let (dispatcher, _lanes) =
        FanOutDispatcher::spawn(sinks, LaneConfig::default(), &metrics, cancel.clone());

    let (tx, rx) = measurement_channel();
    pipeline::start(
        PipelineConfig {
            mode: DeliveryMode::Batch,
            forwarder_count: 1,
            flush_interval: Duration::from_millis(100),
        },
        rx,
        dispatcher,
        cancel.clone(),
    );

    for id in ["a", "b", "c"] {
        tx.send(sample(id)).await.unwrap();
    }

    wait_until(Duration::from_secs(5), || async { recording.len() == 3 }).await;
    wait_until(Duration::from_secs(5), || async {
        metrics.lane("recording").successes() == 1
    })
    .await;
    cancel.cancel();
}
