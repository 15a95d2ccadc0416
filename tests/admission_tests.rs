//! Admission control exercised over the HTTP surface.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use chain_sentinel::api::SentinelServer;
use chain_sentinel::core::config::{FailurePolicy, RouteBudget, SentinelConfig};
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::time::Duration;

fn config_with_budgets(
    oracle_url: &str,
    scoring: RouteBudget,
    general: RouteBudget,
    policy: FailurePolicy,
) -> SentinelConfig {
    let mut config = SentinelConfig::default();
    config.scoring.base_url = oracle_url.to_string();
    config.admission.scoring = scoring;
    config.admission.general = general;
    config.admission.failure_policy = policy;
    config
}

fn client_header(id: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-client-id"),
        HeaderValue::from_static(id),
    )
}

fn mock_clean_oracle(oracle: &MockServer) {
    oracle.mock(|when, then| {
        when.method(POST).path("/predict");
        then.status(200).json_body(json!({
            "tx_hash": "admtx1",
            "is_fraud": false,
            "confidence": 0.1,
            "risk_score": 0.1,
            "model_predictions": {},
            "timestamp": "2024-01-01T00:00:00Z"
        }));
    });
}

fn tx_payload() -> Value {
    json!({
        "tx_hash": "admtx1",
        "amount": 10.0,
        "sender": "senderAddr1",
        "receiver": "receiverAddr1",
        "network": "bitcoin"
    })
}

#[tokio::test]
async fn test_scoring_budget_exhaustion_returns_429_with_hint() {
    let oracle = MockServer::start();
    mock_clean_oracle(&oracle);
    let config = config_with_budgets(
        &oracle.base_url(),
        RouteBudget { permits: 3, window_secs: 60 },
        RouteBudget { permits: 100, window_secs: 60 },
        FailurePolicy::Open,
    );
    let sentinel = SentinelServer::new("127.0.0.1".to_string(), 0, config).unwrap();
    let server = TestServer::new(sentinel.create_router()).unwrap();

    let (name, value) = client_header("client-a");
    for _ in 0..3 {
        server
            .post("/api/transactions/analyze")
            .add_header(name.clone(), value.clone())
            .json(&tx_payload())
            .await
            .assert_status_ok();
    }

    let denied = server
        .post("/api/transactions/analyze")
        .add_header(name.clone(), value.clone())
        .json(&tx_payload())
        .await;
    denied.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = denied
        .header("retry-after")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    let body: Value = denied.json();
    assert_eq!(body["code"], "RATE_LIMITED");
    assert!(body["retry_after_secs"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_clients_have_independent_budgets() {
    let oracle = MockServer::start();
    mock_clean_oracle(&oracle);
    let config = config_with_budgets(
        &oracle.base_url(),
        RouteBudget { permits: 1, window_secs: 60 },
        RouteBudget { permits: 100, window_secs: 60 },
        FailurePolicy::Open,
    );
    let sentinel = SentinelServer::new("127.0.0.1".to_string(), 0, config).unwrap();
    let server = TestServer::new(sentinel.create_router()).unwrap();

    let (name, a) = client_header("client-a");
    server
        .post("/api/transactions/analyze")
        .add_header(name.clone(), a.clone())
        .json(&tx_payload())
        .await
        .assert_status_ok();
    server
        .post("/api/transactions/analyze")
        .add_header(name.clone(), a)
        .json(&tx_payload())
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    // a different client still has its own budget
    let (name, b) = client_header("client-b");
    server
        .post("/api/transactions/analyze")
        .add_header(name, b)
        .json(&tx_payload())
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_scoring_exhaustion_leaves_general_budget_intact() {
    let oracle = MockServer::start();
    mock_clean_oracle(&oracle);
    let config = config_with_budgets(
        &oracle.base_url(),
        RouteBudget { permits: 1, window_secs: 60 },
        RouteBudget { permits: 100, window_secs: 60 },
        FailurePolicy::Open,
    );
    let sentinel = SentinelServer::new("127.0.0.1".to_string(), 0, config).unwrap();
    let server = TestServer::new(sentinel.create_router()).unwrap();

    let (name, value) = client_header("client-a");
    server
        .post("/api/transactions/analyze")
        .add_header(name.clone(), value.clone())
        .json(&tx_payload())
        .await
        .assert_status_ok();
    server
        .post("/api/transactions/analyze")
        .add_header(name.clone(), value.clone())
        .json(&tx_payload())
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    // reads still admitted for the same client
    server
        .get("/api/stats")
        .add_header(name, value)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_budget_replenishes_after_window() {
    let oracle = MockServer::start();
    let config = config_with_budgets(
        &oracle.base_url(),
        RouteBudget { permits: 30, window_secs: 60 },
        RouteBudget { permits: 2, window_secs: 1 },
        FailurePolicy::Open,
    );
    let sentinel = SentinelServer::new("127.0.0.1".to_string(), 0, config).unwrap();
    let server = TestServer::new(sentinel.create_router()).unwrap();

    let (name, value) = client_header("client-a");
    for _ in 0..2 {
        server
            .get("/api/stats")
            .add_header(name.clone(), value.clone())
            .await
            .assert_status_ok();
    }
    server
        .get("/api/stats")
        .add_header(name.clone(), value.clone())
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    // one permit drips back after window/permits
    tokio::time::sleep(Duration::from_millis(700)).await;
    server
        .get("/api/stats")
        .add_header(name, value)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_fail_open_admits_on_store_failure() {
    let oracle = MockServer::start();
    let config = config_with_budgets(
        &oracle.base_url(),
        RouteBudget { permits: 30, window_secs: 60 },
        RouteBudget { permits: 1, window_secs: 60 },
        FailurePolicy::Open,
    );
    let sentinel = SentinelServer::new("127.0.0.1".to_string(), 0, config).unwrap();
    sentinel.admission().set_store_broken(true);
    let server = TestServer::new(sentinel.create_router()).unwrap();

    // budget of 1 would deny the repeats if the counter were consulted
    for _ in 0..5 {
        server.get("/api/stats").await.assert_status_ok();
    }
}

#[tokio::test]
async fn test_fail_closed_denies_on_store_failure() {
    let oracle = MockServer::start();
    let config = config_with_budgets(
        &oracle.base_url(),
        RouteBudget { permits: 30, window_secs: 60 },
        RouteBudget { permits: 100, window_secs: 60 },
        FailurePolicy::Closed,
    );
    let sentinel = SentinelServer::new("127.0.0.1".to_string(), 0, config).unwrap();
    sentinel.admission().set_store_broken(true);
    let server = TestServer::new(sentinel.create_router()).unwrap();

    let response = server.get("/api/stats").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    // recovery restores normal admission
    sentinel.admission().set_store_broken(false);
    server.get("/api/stats").await.assert_status_ok();
}

#[tokio::test]
async fn test_health_is_exempt_from_budgets() {
    let oracle = MockServer::start();
    let config = config_with_budgets(
        &oracle.base_url(),
        RouteBudget { permits: 1, window_secs: 60 },
        RouteBudget { permits: 1, window_secs: 60 },
        FailurePolicy::Open,
    );
    let sentinel = SentinelServer::new("127.0.0.1".to_string(), 0, config).unwrap();
    let server = TestServer::new(sentinel.create_router()).unwrap();

    for _ in 0..10 {
        server.get("/health").await.assert_status_ok();
    }
}
