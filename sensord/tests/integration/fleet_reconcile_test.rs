//! ワーカーレジストリの突き合わせ

use crate::support::{fleet, manifest, wait_until, FakeProbe};
use sensord::config::{AgentConfig, FeedConfig};
use sensord::shutdown::ShutdownController;
use sensord::worker::WorkerState;
use sensord::Agent;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// a → a,b → b の順にスナップショットを適用する
#[tokio::test]
async fn test_scenario_add_then_remove() {
    let (registry, _rx) = fleet(Arc::new(FakeProbe::default()), Duration::from_secs(60));

    registry.reconcile(&manifest(&[("a", "http://x")])).await;
    assert_eq!(registry.ids().await, vec!["a"]);
    assert!(registry.is_running("a").await);
    let handle_a = registry.handle("a").await.unwrap();

    registry
        .reconcile(&manifest(&[("a", "http://x"), ("b", "http://y")]))
        .await;
    assert_eq!(registry.ids().await, vec!["a", "b"]);

    registry.reconcile(&manifest(&[("b", "http://y")])).await;
    assert_eq!(registry.ids().await, vec!["b"]);
    assert!(handle_a.is_stop_requested());
    assert_ne!(handle_a.state(), WorkerState::Running);

    registry.stop_all().await;
}

/// 同じスナップショットの再適用では何も増減しない
#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let (registry, _rx) = fleet(Arc::new(FakeProbe::default()), Duration::from_secs(60));
    let snapshot = manifest(&[("a", "http://x"), ("b", "http://y")]);

    let first = registry.reconcile(&snapshot).await;
    assert_eq!(first.added.len(), 2);
    let handle_a = registry.handle("a").await.unwrap();

    let second = registry.reconcile(&snapshot).await;
    assert!(second.is_noop());
    assert!(!handle_a.is_stop_requested());

    registry.stop_all().await;
}

/// URLだけ変わったチェックは作り直さない
#[tokio::test]
async fn test_url_change_under_same_id_is_not_detected() {
    let (registry, _rx) = fleet(Arc::new(FakeProbe::default()), Duration::from_secs(60));
    registry.reconcile(&manifest(&[("a", "http://x")])).await;

    let report = registry.reconcile(&manifest(&[("a", "http://changed")])).await;
    assert!(report.is_noop());
    assert_eq!(registry.list().await[0].url, "http://x");

    registry.stop_all().await;
}

/// 並行した突き合わせでも同じIDのワーカーは1つだけ
#[tokio::test]
async fn test_concurrent_reconcile_keeps_single_worker() {
    let (registry, _rx) = fleet(Arc::new(FakeProbe::default()), Duration::from_secs(60));
    let snapshot = manifest(&[("a", "http://x"), ("b", "http://y")]);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            let snapshot = snapshot.clone();
            tokio::spawn(async move { registry.reconcile(&snapshot).await })
        })
        .collect();

    let mut added = 0;
    for task in tasks {
        added += task.await.unwrap().added.len();
    }
    assert_eq!(added, 2);
    assert_eq!(registry.len().await, 2);

    registry.stop_all().await;
}

/// 取得失敗の周期では稼働中のワーカーを維持する
#[tokio::test]
async fn test_fetch_failure_keeps_current_fleet() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"[{"id":"a","url":"http://x"},{"id":"b","url":"http://y"}]"#),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = AgentConfig::new(server.uri());
    config.manifest_interval = Duration::from_millis(50);
    config.feed = Some(FeedConfig {
        bind_addr: "127.0.0.1:0".into(),
        credentials: None,
    });
    let agent = Agent::start_with_probe(
        config,
        ShutdownController::default(),
        Arc::new(FakeProbe::default()),
    )
    .await
    .unwrap();

    wait_until(Duration::from_secs(5), || async {
        agent.registry().len().await == 2
    })
    .await;

    // 失敗する取得が何度か走るのを待つ
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(agent.registry().ids().await, vec!["a", "b"]);
    assert!(agent
        .metrics()
        .encode()
        .unwrap()
        .contains("sensord_manifest_refresh_total{result=\"error\"}"));

    agent.stop().await.unwrap();
}
