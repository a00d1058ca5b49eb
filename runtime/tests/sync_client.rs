//! Sync client against a mock persistence endpoint.

use marketsweep::Listing;
use marketsweep_runtime::config::SyncSettings;
use marketsweep_runtime::sync::{SyncClient, SyncOutcome};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer, token: Option<&str>) -> SyncSettings {
    SyncSettings {
        endpoint: Some(format!("{}/v1/listings", server.uri())),
        token: token.map(str::to_string),
        retry_backoff_ms: 1,
        ..SyncSettings::default()
    }
}

fn listing() -> Listing {
    let mut l = Listing::new("12345678", "https://www.facebook.com/marketplace/item/12345678/");
    l.title = Some("Road bike".to_string());
    l.price = Some(350.0);
    l
}

#[tokio::test]
async fn test_upsert_puts_flat_listing_with_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/listings/shop-1/12345678"))
        .and(header("authorization", "Bearer s3cret"))
        .and(body_partial_json(serde_json::json!({
            "scope": "shop-1",
            "external_id": "12345678",
            "title": "Road bike",
            "price": 350.0,
            "status": "active"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = SyncClient::new(&settings(&server, Some("s3cret"))).unwrap();
    let outcome = client.upsert("shop-1", &listing()).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Stored { status: 200 });
}

#[tokio::test]
async fn test_client_error_is_a_soft_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(422))
        .expect(1)
        .mount(&server)
        .await;

    let client = SyncClient::new(&settings(&server, None)).unwrap();
    let outcome = client.upsert("shop-1", &listing()).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Rejected { status: 422 });
    assert!(!outcome.is_stored());
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = SyncClient::new(&settings(&server, None)).unwrap();
    let outcome = client.upsert("shop-1", &listing()).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Stored { status: 201 });
}

#[tokio::test]
async fn test_persistent_server_error_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = SyncClient::new(&settings(&server, None)).unwrap();
    let outcome = client.upsert("shop-1", &listing()).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Rejected { status: 500 });
}

#[tokio::test]
async fn test_unreachable_endpoint_is_an_error() {
    let settings = SyncSettings {
        endpoint: Some("http://127.0.0.1:9/v1/listings".to_string()),
        timeout_ms: 2000,
        ..SyncSettings::default()
    };
    let client = SyncClient::new(&settings).unwrap();
    assert!(client.upsert("shop-1", &listing()).await.is_err());
}
