//! Integration tests for the monitor API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use monitor_lib::{
    delivery::{BotIdentity, BurstConfig, DeliveryError, MessageTransport, SenderConfig},
    health::{components, HealthRegistry},
    observability::{MonitorMetrics, StructuredLogger},
    NotifierClient,
};
use position_monitor::api::{create_router, AppState, SendResponse, StatusResponse};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingTransport {
    delivered: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        self.delivered.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn identity(&self) -> Result<BotIdentity, DeliveryError> {
        Ok(BotIdentity {
            username: "test_bot".to_string(),
        })
    }
}

async fn setup_test_app() -> (Router, Arc<AppState>, Arc<RecordingTransport>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SENDER).await;
    health_registry.register(components::BRIDGE).await;

    let transport = Arc::new(RecordingTransport::default());
    let notifier = NotifierClient::with_transport(
        transport.clone(),
        BurstConfig::new(Duration::from_secs(5), Duration::from_secs(10)),
        SenderConfig::default()
            .with_poll_intervals(Duration::from_millis(10), Duration::from_millis(1)),
        StructuredLogger::new("test"),
        tokio::runtime::Handle::current(),
    )
    .unwrap();

    let state = Arc::new(AppState::new(health_registry, Arc::new(notifier)));
    let router = create_router(state.clone());

    (router, state, transport)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, state, _) = setup_test_app().await;

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["sender"].is_object());
    assert!(health["components"]["bridge"].is_object());
    state.notifier.close();
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state, _) = setup_test_app().await;
    state
        .health_registry
        .set_degraded(components::BRIDGE, "Bridge unreachable")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    // Degraded still returns 200 (operational)
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["bridge"]["message"],
        "Bridge unreachable"
    );
    state.notifier.close();
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state, _) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::SENDER, "Sender thread is not running")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "unhealthy");
    state.notifier.close();
}

#[tokio::test]
async fn test_readyz_follows_readiness() {
    let (app, state, _) = setup_test_app().await;

    let response = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["ready"], false);

    state.health_registry.set_ready(true).await;
    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ready"], true);
    state.notifier.close();
}

#[tokio::test]
async fn test_status_reports_rate_limit() {
    let (app, state, _) = setup_test_app().await;

    let response = app.oneshot(get("/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status: StatusResponse = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(status.rate_limit.rate_limit_max, 18);
    assert_eq!(status.rate_limit.provider_limit, 20);
    assert_eq!(status.rate_limit.window_secs, 58.0);
    assert!(status.rate_limit.running);
    assert_eq!(status.pending, 0);
    state.notifier.close();
}

#[tokio::test]
async fn test_post_message_is_buffered() {
    let (app, state, _) = setup_test_app().await;

    let response = app
        .oneshot(post_json(
            "/messages",
            serde_json::json!({ "text": "⚠️ ATTENTION @ 09:15:00\nUser: FZ20267\nIssue: x" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let sent: SendResponse = serde_json::from_value(body_json(response).await).unwrap();
    assert!(sent.accepted);
    // Held by the 5 s silence window
    assert_eq!(sent.pending, 1);
    state.notifier.close();
}

#[tokio::test]
async fn test_post_urgent_message_is_delivered() {
    let (app, state, transport) = setup_test_app().await;

    let response = app
        .oneshot(post_json(
            "/messages",
            serde_json::json!({ "text": "🚨 margin breach", "urgent": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    for _ in 0..200 {
        if !transport.delivered.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        *transport.delivered.lock().unwrap(),
        vec!["🚨 margin breach".to_string()]
    );
    state.notifier.close();
}

#[tokio::test]
async fn test_post_empty_message_is_rejected() {
    let (app, state, _) = setup_test_app().await;

    let response = app
        .oneshot(post_json("/messages", serde_json::json!({ "text": "   " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["accepted"], false);
    state.notifier.close();
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state, _) = setup_test_app().await;

    let metrics = MonitorMetrics::new();
    metrics.observe_delivery_latency(0.12);
    metrics.inc_alert_emitted("mtm_below");
    metrics.set_queue_depth(3);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("position_monitor_delivery_latency_seconds_bucket"));
    assert!(metrics_text.contains("position_monitor_alerts_emitted_total"));
    assert!(metrics_text.contains("position_monitor_queue_depth"));
    state.notifier.close();
}
