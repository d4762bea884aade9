//! Fault injection across a proxied hop.

use axum::http::StatusCode;
use serde_json::Value;

mod common;

use common::{closed_addr, http_client, start_node, start_node_with, start_stub};

#[tokio::test]
async fn test_total_error_rate_fails_without_calling_next_hop() {
    let stub = start_stub(200, "should not be reached").await;
    let node = start_node_with("svc-a", |config| config.behavior.errors = 100).await;

    let res = http_client()
        .get(node.url(&format!("/proxy/{}/echo", stub.addr)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "internal service failure occurred");
    assert_eq!(body["service"], "svc-a");
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn test_passthrough_is_byte_identical() {
    let stub = start_stub(200, "stub-body-1234567890").await;
    let node = start_node("svc-a").await;

    let res = http_client()
        .get(node.url(&format!("/proxy/{}/some/path?x=1", stub.addr)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "stub-body-1234567890");
    assert_eq!(stub.calls(), 1);

    let head = &stub.requests()[0];
    assert!(head.starts_with("get /some/path?x=1 http/1.1"), "{head}");
    assert!(head.contains("proxied-by: svc-a"), "{head}");
    assert!(head.contains("x-forwarded-for: 127.0.0.1"), "{head}");
    assert!(head.contains("x-b3-traceid:"), "{head}");
}

#[tokio::test]
async fn test_failures_pass_through_when_not_absorbing() {
    let stub = start_stub(503, "backend down").await;
    let node = start_node("svc-a").await;

    let res = http_client()
        .get(node.url(&format!("/proxy/{}/", stub.addr)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "backend down");
}

#[tokio::test]
async fn test_absorbed_failure_becomes_local_success() {
    let stub = start_stub(503, "backend down").await;
    let node = start_node("svc-a").await;
    let client = http_client();

    let res = client.get(node.url("/graceful/true")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(node.url(&format!("/proxy/{}/errors/5", stub.addr)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["service"], "svc-a");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("backend down"), "{message}");
    assert!(message.starts_with("svc-a called http://"), "{message}");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_unreachable_next_hop_is_bad_gateway() {
    let node = start_node("svc-a").await;
    let target = closed_addr().await;

    let res = http_client()
        .get(node.url(&format!("/proxy/{target}/echo")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "downstream service could not be reached");
}

#[tokio::test]
async fn test_injected_latency_applies_to_echo() {
    let node = start_node_with("svc-a", |config| config.behavior.latency = "150ms".to_string()).await;

    let start = std::time::Instant::now();
    let res = http_client().get(node.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(start.elapsed() >= std::time::Duration::from_millis(150));
}
