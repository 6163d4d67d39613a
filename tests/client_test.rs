use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tonearm::ta_core::{HttpTimeouts, ReqwestTransport};
use tonearm::{
    ClientConfig, Credential, CredentialStore, Error, MemoryCredentialStore,
    NetworkRecoveryHandler, ProofKeyAuthenticator, RecoveryPolicy, RequestError, TonearmClient,
};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn config(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::from_toml_str(&format!(
        r#"
client_id = "client-123"
redirect_uri = "http://127.0.0.1:8888/callback"
api_base_url = "{uri}/v1"
token_url = "{uri}/api/token"

[recovery]
max_network_retries = 2
base_retry_delay_ms = 10
max_retry_delay_ms = 50
max_rate_limit_retries = 1
"#,
        uri = server.uri()
    ))
    .unwrap();
    config.http.request_timeout_ms = 2_000;
    config
}

fn token_body(access_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
    })
}

fn credential(access_token: &str, expires_in_secs: i64) -> Credential {
    Credential::new(
        access_token,
        Some("AQB".to_string()),
        chrono::Utc::now() + chrono::Duration::seconds(expires_in_secs),
        None,
        "Bearer",
    )
}

async fn setup(
    server: &MockServer,
    stored: Credential,
) -> (TonearmClient, Arc<MemoryCredentialStore>) {
    let config = config(server);
    let store = Arc::new(MemoryCredentialStore::with_credential(stored));
    let auth = ProofKeyAuthenticator::new(config.auth_config().unwrap(), store.clone()).unwrap();
    let client = TonearmClient::from_config(&config, Arc::new(auth)).unwrap();
    (client, store)
}

#[tokio::test]
async fn test_valid_credential_used_without_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("unused")))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/albums/1"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1"})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = setup(&server, credential("fresh", 3600)).await;
    let album: serde_json::Value = client.get_json("albums/1").await.unwrap();

    assert_eq!(album["id"], "1");
}

#[tokio::test]
async fn test_expired_credential_refreshed_before_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("renewed")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/albums/1"))
        .and(header("authorization", "Bearer renewed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = setup(&server, credential("stale", -60)).await;
    client.get("albums/1").await.unwrap();

    let saved = store.load().await.unwrap().unwrap();
    assert_eq!(saved.access_token(), "renewed");
    assert_eq!(saved.refresh_token(), Some("AQB"));
}

#[tokio::test]
async fn test_unauthorized_triggers_refresh_and_retry() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("renewed")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .and(header("authorization", "Bearer revoked"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .and(header("authorization", "Bearer renewed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "me"})))
        .expect(1)
        .mount(&server)
        .await;

    // not expired locally, but the server no longer accepts it
    let (client, _) = setup(&server, credential("revoked", 3600)).await;
    let response = client.get("me").await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("renewed"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/albums/1"))
        .and(header("authorization", "Bearer renewed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(8)
        .mount(&server)
        .await;

    let (client, _) = setup(&server, credential("stale", -60)).await;

    let requests = (0..8).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { client.get("albums/1").await })
    });

    for result in futures::future::join_all(requests).await {
        assert_eq!(result.unwrap().unwrap().status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_rate_limit_snapshot_recorded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/albums/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-RateLimit-Remaining", "41")
                .insert_header("X-RateLimit-Limit", "100"),
        )
        .mount(&server)
        .await;

    let (client, _) = setup(&server, credential("fresh", 3600)).await;
    client.get("albums/1").await.unwrap();

    let snapshot = client.rate_limit().unwrap();
    assert_eq!(snapshot.remaining, Some(41));
    assert_eq!(snapshot.limit, Some(100));
    assert_eq!(snapshot.status_code, 200);
    assert_eq!(snapshot.path, "/v1/albums/1");
}

#[tokio::test]
async fn test_rate_limit_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/albums/1"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "0")
                .insert_header("X-RateLimit-Remaining", "0"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let (client, _) = setup(&server, credential("fresh", 3600)).await;

    match client.get("albums/1").await {
        Err(Error::Request(RequestError::RateLimited {
            snapshot,
            retry_after,
            response,
        })) => {
            assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(retry_after, Some(Duration::ZERO));
            assert!(snapshot.unwrap().is_exhausted());
        }
        other => panic!("Expected RateLimited error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_errors_retried_then_returned() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/albums/1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .expect(3)
        .mount(&server)
        .await;

    let (client, _) = setup(&server, credential("fresh", 3600)).await;
    let err = client.get("albums/1").await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
}

#[tokio::test]
async fn test_invalid_refresh_token_surfaces_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh token revoked",
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (client, _) = setup(&server, credential("stale", -60)).await;

    match client.get("albums/1").await {
        Err(Error::Auth(err)) => assert!(err.oauth_error().unwrap().is_invalid_grant()),
        other => panic!("Expected Auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_explicit_transport_and_policy() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/albums/1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::with_credential(credential("fresh", 3600)));
    let auth =
        ProofKeyAuthenticator::new(config(&server).auth_config().unwrap(), store).unwrap();
    let transport = ReqwestTransport::new(&HttpTimeouts::default(), None).unwrap();
    let client = TonearmClient::with_transport(
        Url::parse(&format!("{}/v1", server.uri())).unwrap(),
        Arc::new(auth),
        Arc::new(transport),
        NetworkRecoveryHandler::new(RecoveryPolicy::disabled()),
    );

    let err = client.get("albums/1").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
}
