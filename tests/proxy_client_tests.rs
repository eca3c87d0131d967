//! Integration tests for the resilient proxy client: retry, circuit breaker,
//! caching, and response-shape tolerance against a wiremock server.

use llm_admin::proxy::{ProxyClient, ProxyError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod test_utils;
use test_utils::{model_info_entry, test_config};

fn client_for(server: &MockServer) -> ProxyClient {
    ProxyClient::new(test_config(&server.uri()).proxy).unwrap()
}

#[tokio::test]
async fn test_retries_transient_failure_then_succeeds() {
    let server = MockServer::start().await;

    // First attempt fails with a 500, the retry lands on the healthy mock.
    Mock::given(method("GET"))
        .and(path("/model/info"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/model/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [model_info_entry("gpt-4o", "abc-123", 0.0000025)]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let models = client.get_models(true).await.unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "gpt-4o");
    assert_eq!(models[0].external_id.as_deref(), Some("abc-123"));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/key/generate"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "invalid budget" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .request(reqwest::Method::POST, "/key/generate", Some(&json!({})))
        .await
        .unwrap_err();

    match err {
        ProxyError::Validation { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "invalid budget");
        }
        other => panic!("expected Validation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_circuit_breaker_opens_and_fails_fast() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health/liveliness"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri()).proxy;
    config.breaker_failure_threshold = 4;
    config.breaker_open_seconds = 60;
    let client = ProxyClient::new(config).unwrap();

    // Two requests of two attempts each exhaust the threshold.
    for _ in 0..2 {
        let err = client.health(true).await.unwrap_err();
        assert!(matches!(err, ProxyError::Unavailable { .. }));
    }

    assert!(client.circuit_open());
    let err = client.health(true).await.unwrap_err();
    assert!(matches!(err, ProxyError::CircuitOpen));
}

#[tokio::test]
async fn test_client_errors_do_not_trip_breaker() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health/liveliness"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "detail": "nope"
        })))
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri()).proxy;
    config.breaker_failure_threshold = 2;
    let client = ProxyClient::new(config).unwrap();

    for _ in 0..5 {
        let err = client.health(true).await.unwrap_err();
        assert!(matches!(err, ProxyError::Validation { status: 404, .. }));
    }
    assert!(!client.circuit_open());
}

#[tokio::test]
async fn test_model_list_served_from_cache() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/model/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [model_info_entry("gpt-4o", "abc-123", 0.0000025)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.get_models(false).await.unwrap();
    let second = client.get_models(false).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_force_refresh_bypasses_cache() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/model/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.get_models(false).await.unwrap();
    client.get_models(true).await.unwrap();
}

#[tokio::test]
async fn test_no_models_configured_is_empty_catalog() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/model/info"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "No models configured on this proxy" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let models = client.get_models(true).await.unwrap();
    assert!(models.is_empty());

    // The empty catalog was cached like a normal listing.
    let cached = client.get_models(false).await.unwrap();
    assert!(cached.is_empty());
}

#[tokio::test]
async fn test_stale_catalog_served_when_proxy_down() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/model/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [model_info_entry("gpt-4o", "abc-123", 0.0000025)]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/model/info"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fresh = client.get_models(true).await.unwrap();
    assert_eq!(fresh.len(), 1);

    // The proxy is now failing; the stale cached catalog is still served.
    let stale = client.get_models(true).await.unwrap();
    assert_eq!(stale, fresh);
}

#[tokio::test]
async fn test_delete_key_swallows_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/key/delete"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "detail": { "error": "key not found in db" }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.delete_key("sk-gone").await.unwrap();
}

#[tokio::test]
async fn test_delete_key_propagates_other_rejections() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/key/delete"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "message": "insufficient permissions" }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.delete_key("sk-live").await.unwrap_err();
    assert!(matches!(err, ProxyError::Validation { status: 403, .. }));
}

#[tokio::test]
async fn test_key_update_injects_key_field() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/key/update"))
        .and(body_partial_json(json!({
            "key": "sk-target",
            "models": ["gpt-4o"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .update_key("sk-target", &json!({ "models": ["gpt-4o"] }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_auth_header_sent_on_every_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health/liveliness"))
        .and(header("x-proxy-api-key", "sk-admin-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "healthy" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.health(true).await.unwrap();
}

#[tokio::test]
async fn test_user_absence_inferred_from_placeholder() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "ghost",
            "teams": [],
            "user_info": {}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.get_user("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_daily_activity_walks_all_pages() {
    let server = MockServer::start().await;

    let day = |date: &str| {
        json!({
            "date": date,
            "spend": 1.5,
            "prompt_tokens": 100,
            "completion_tokens": 50,
            "total_tokens": 150,
            "api_requests": 10,
            "models": {}
        })
    };

    Mock::given(method("GET"))
        .and(path("/user/daily/activity"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [day("2026-08-01"), day("2026-08-02")],
            "metadata": { "total_pages": 2, "total_spend": 4.5 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/daily/activity"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [day("2026-08-03")],
            "metadata": { "total_pages": 2, "total_spend": 4.5 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let report = client
        .get_daily_activity("2026-08-01", "2026-08-03")
        .await
        .unwrap();

    assert_eq!(report.days.len(), 3);
    assert_eq!(report.days[2].date, "2026-08-03");
    // Aggregates come from the proxy verbatim, not recomputed.
    assert_eq!(report.metadata["total_spend"], json!(4.5));
}
