//! ストリーミングフィードAPI

use crate::support::{wait_until, FakeProbe};
use sensord::config::{AgentConfig, Credentials, FeedConfig};
use sensord::shutdown::ShutdownController;
use sensord::types::Sample;
use sensord::Agent;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn manifest_url(file: &tempfile::NamedTempFile) -> String {
    reqwest::Url::from_file_path(file.path())
        .unwrap()
        .to_string()
}

async fn start_agent(credentials: Option<Credentials>) -> (Agent, tempfile::NamedTempFile) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"checks":[{{"id":"a","url":"http://x"}}]}}"#).unwrap();

    let mut config = AgentConfig::new(manifest_url(&file));
    config.sample_interval = Duration::from_millis(20);
    config.feed = Some(FeedConfig {
        bind_addr: "127.0.0.1:0".into(),
        credentials,
    });

    let agent = Agent::start_with_probe(
        config,
        ShutdownController::default(),
        Arc::new(FakeProbe::default()),
    )
    .await
    .unwrap();
    (agent, file)
}

#[tokio::test]
async fn test_feed_streams_samples() {
    let (agent, _file) = start_agent(None).await;
    let addr = agent.feed_addr().unwrap();

    let mut res = reqwest::get(format!("http://{addr}/samples")).await.unwrap();
    assert!(res.status().is_success());

    let mut buffer = String::new();
    let line = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let chunk = res.chunk().await.unwrap().unwrap();
            buffer.push_str(std::str::from_utf8(&chunk).unwrap());
            if let Some((line, _)) = buffer.split_once('\n') {
                return line.to_string();
            }
        }
    })
    .await
    .unwrap();

    let sample: Sample = serde_json::from_str(&line).unwrap();
    assert_eq!(sample.check_id, "a");
    assert_eq!(sample.url, "http://x");
    assert_eq!(sample.measurement.http_status, 200);

    // 接続中のストリームはシャットダウンで閉じられる
    tokio::time::timeout(Duration::from_secs(5), agent.stop())
        .await
        .expect("stop hung on open feed connection")
        .unwrap();
    drop(res);
}

#[tokio::test]
async fn test_feed_requires_credentials() {
    let (agent, _file) = start_agent(Some(Credentials {
        username: "user".into(),
        password: "secret".into(),
    }))
    .await;
    let addr = agent.feed_addr().unwrap();
    let client = reqwest::Client::new();

    let res = client
        .get(format!("http://{addr}/samples"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("http://{addr}/samples"))
        .basic_auth("user", Some("secret"))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    drop(res);

    agent.stop().await.unwrap();
}

#[tokio::test]
async fn test_checks_endpoint_lists_workers() {
    let (agent, _file) = start_agent(None).await;
    let addr = agent.feed_addr().unwrap();

    wait_until(Duration::from_secs(5), || async {
        agent.registry().len().await == 1
    })
    .await;

    let workers: serde_json::Value = reqwest::get(format!("http://{addr}/checks"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(workers[0]["id"], "a");
    assert_eq!(workers[0]["state"], "running");

    agent.stop().await.unwrap();
}
