mod common;

use axum::http::StatusCode;
use serde_json::json;
use std::time::{Duration, Instant};

use stackcheck::core::probe::{EndpointProbe, HttpMethod, HttpProbe, ProbeRequest};
use stackcheck::core::report::ProbeStatus;

async fn backend() -> String {
    common::serve(common::backend(StatusCode::INTERNAL_SERVER_ERROR, 3, common::Hits::default())).await
}

#[tokio::test]
async fn test_2xx_is_healthy() {
    let base = backend().await;
    let probe = EndpointProbe::new().unwrap();

    let result = probe
        .check("/health", &ProbeRequest::get(format!("{}/health", base), Duration::from_secs(2)))
        .await;

    assert_eq!(result.status, ProbeStatus::Healthy);
    assert!(result.detail.starts_with("HTTP 200"));
}

#[tokio::test]
async fn test_5xx_is_unhealthy() {
    let base = backend().await;
    let probe = EndpointProbe::new().unwrap();

    let result = probe
        .check("/stats", &ProbeRequest::get(format!("{}/stats", base), Duration::from_secs(2)))
        .await;

    assert_eq!(result.status, ProbeStatus::Unhealthy);
    assert_eq!(result.detail, "HTTP 500");
}

#[tokio::test]
async fn test_unknown_route_is_unhealthy() {
    let base = backend().await;
    let probe = EndpointProbe::new().unwrap();

    let result = probe
        .check("/missing", &ProbeRequest::get(format!("{}/missing", base), Duration::from_secs(2)))
        .await;

    assert_eq!(result.status, ProbeStatus::Unhealthy);
    assert_eq!(result.detail, "HTTP 404");
}

#[tokio::test]
async fn test_slow_endpoint_times_out_as_error() {
    let base = backend().await;
    let probe = EndpointProbe::new().unwrap();
    let timeout = Duration::from_millis(300);

    let started = Instant::now();
    let result = probe
        .check("/slow", &ProbeRequest::get(format!("{}/slow", base), timeout))
        .await;

    assert_eq!(result.status, ProbeStatus::Error);
    assert!(result.detail.contains("timed out"), "detail: {}", result.detail);
    assert!(started.elapsed() < timeout + Duration::from_secs(2));
}

#[tokio::test]
async fn test_connection_refused_is_error() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let probe = EndpointProbe::new().unwrap();
    let result = probe
        .check("backend", &ProbeRequest::get(format!("http://127.0.0.1:{}/health", port), Duration::from_secs(2)))
        .await;

    assert_eq!(result.status, ProbeStatus::Error);
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let base = backend().await;
    let probe = EndpointProbe::new().unwrap();

    let request = ProbeRequest {
        url: format!("{}/echo", base),
        method: HttpMethod::Post,
        body: Some(json!({"dish_name": "biryani", "filters": null})),
        timeout: Duration::from_secs(2),
    };
    let exchange = probe.exchange(&request).await;

    assert_eq!(exchange.status_code, Some(200));
    let echoed: serde_json::Value = serde_json::from_str(exchange.body().unwrap()).unwrap();
    assert_eq!(echoed["dish_name"], "biryani");
    assert!(echoed["filters"].is_null());
}
