use std::time::{Duration, Instant};

use reqwest::StatusCode;
use ta_core::{
    HttpRequest, HttpTimeouts, NetworkRecoveryHandler, RecoveryPolicy, RequestError,
    ReqwestTransport, TransportErrorKind,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> ReqwestTransport {
    ReqwestTransport::new(&HttpTimeouts::default(), Some("tonearm-tests")).unwrap()
}

fn handler(retries: u32) -> NetworkRecoveryHandler {
    let policy =
        RecoveryPolicy::new(retries, Duration::from_millis(10), Duration::from_millis(50)).unwrap();
    NetworkRecoveryHandler::new(policy)
}

fn request(server: &MockServer, route: &str) -> HttpRequest {
    HttpRequest::get(format!("{}{}", server.uri(), route).parse().unwrap())
}

#[tokio::test]
async fn test_retry_after_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/albums/1"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "2")
                .insert_header("X-RateLimit-Remaining", "0"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/albums/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-RateLimit-Remaining", "99")
                .set_body_string("{\"id\":\"1\"}"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let handler = handler(0);
    let started = Instant::now();
    let response = handler
        .send(&transport(), &request(&server, "/v1/albums/1"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(handler.rate_limits().latest().unwrap().remaining, Some(99));
}

#[tokio::test]
async fn test_service_unavailable_retried_until_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&server)
        .await;

    let result = handler(2).send(&transport(), &request(&server, "/v1/me")).await;

    match result {
        Err(RequestError::Status(response)) => {
            assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(response.text(), "maintenance");
        }
        other => panic!("expected 503, got {:?}", other),
    }
}

#[tokio::test]
async fn test_not_found_single_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/tracks/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = handler(3)
        .send(&transport(), &request(&server, "/v1/tracks/missing"))
        .await;

    assert_eq!(result.unwrap_err().status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn test_timeouts_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(2)
        .mount(&server)
        .await;

    let timeouts = HttpTimeouts {
        connect: Duration::from_secs(1),
        request: Duration::from_millis(200),
    };
    let transport = ReqwestTransport::new(&timeouts, None).unwrap();

    let result = handler(1).send(&transport, &request(&server, "/v1/slow")).await;

    match result {
        Err(RequestError::Transport(err)) => assert_eq!(err.kind, TransportErrorKind::Timeout),
        other => panic!("expected timeout, got {:?}", other),
    }
}
