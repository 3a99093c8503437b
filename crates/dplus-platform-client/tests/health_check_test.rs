//! Tests for PlatformClient::health_check().

use dplus_platform_client::{PlatformClient, PlatformConfig};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn health_check_all_reachable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&mock_server)
        .await;

    let config = PlatformConfig::local_mock(&mock_server.uri(), "anon-key").unwrap();
    let client = PlatformClient::new(config).unwrap();

    let result = client.health_check().await;
    assert!(result.all_healthy());
    assert_eq!(result.reachable, ["rest", "auth"]);
}

#[tokio::test]
async fn health_check_error_status_still_counts_as_reachable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let config = PlatformConfig::local_mock(&mock_server.uri(), "anon-key").unwrap();
    let client = PlatformClient::new(config).unwrap();
    assert!(client.health_check().await.all_healthy());
}

#[tokio::test]
async fn health_check_unreachable() {
    // Nothing listens on port 1.
    let config = PlatformConfig::local_mock("http://127.0.0.1:1", "anon-key").unwrap();
    let client = PlatformClient::new(config).unwrap();

    let result = client.health_check().await;
    assert!(!result.all_healthy());
    assert_eq!(result.unreachable.len(), 2);
    assert!(result.reachable.is_empty());
}
