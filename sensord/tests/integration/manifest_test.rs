//! マニフェスト取得

use reqwest::Client;
use sensord::error::ManifestError;
use sensord::manifest::ManifestSource;
use sensord::types::ServiceKind;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve(body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_full_manifest_with_services() {
    let server = serve(
        r#"{
            "checks": [
                {"id": "a", "url": "http://x", "services": ["log", "collector"]},
                {"id": "b", "url": "http://y", "location": "eu-west"}
            ],
            "services": [
                {"id": "log", "type": "logfmt"},
                {"id": "collector", "type": "udp", "addr": "127.0.0.1:9000"}
            ]
        }"#,
    )
    .await;

    let manifest = ManifestSource::new(Client::new(), format!("{}/manifest.json", server.uri()))
        .fetch()
        .await
        .unwrap();

    assert_eq!(manifest.checks.len(), 2);
    assert_eq!(manifest.checks[0].services, vec!["log", "collector"]);
    assert_eq!(manifest.checks[1].location.as_deref(), Some("eu-west"));
    assert_eq!(manifest.services[0].kind, ServiceKind::Logfmt);
    assert_eq!(
        manifest.services[1].kind,
        ServiceKind::Udp {
            addr: "127.0.0.1:9000".into()
        }
    );
}

#[tokio::test]
async fn test_duplicate_ids_keep_first() {
    let server = serve(r#"[{"id":"a","url":"http://first"},{"id":"a","url":"http://second"}]"#).await;

    let manifest = ManifestSource::new(Client::new(), format!("{}/manifest.json", server.uri()))
        .fetch()
        .await
        .unwrap();

    assert_eq!(manifest.checks.len(), 1);
    assert_eq!(manifest.checks[0].url, "http://first");
}

#[tokio::test]
async fn test_unreachable_source_is_error() {
    let source = ManifestSource::new(Client::new(), "http://127.0.0.1:1/manifest.json");
    assert!(matches!(
        source.fetch().await.unwrap_err(),
        ManifestError::Http(_)
    ));
}
