//! HTTP API for health checks, Prometheus metrics and the message queue

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use monitor_lib::{
    health::{ComponentStatus, HealthRegistry},
    NotifierClient, RateLimitStatus,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub notifier: Arc<NotifierClient>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, notifier: Arc<NotifierClient>) -> Self {
        Self {
            health_registry,
            notifier,
            started_at: Utc::now(),
        }
    }
}

/// Body of `GET /status`
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: i64,
    /// Messages in the burst buffer plus the send queue
    pub pending: usize,
    pub rate_limit: RateLimitStatus,
}

/// Body of `POST /messages`
#[derive(Debug, Serialize, Deserialize)]
pub struct SendRequest {
    pub text: String,
    #[serde(default)]
    pub urgent: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub accepted: bool,
    pub pending: usize,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        pending: state.notifier.pending_count(),
        rate_limit: state.notifier.rate_limit_status(),
    };
    Json(response)
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendRequest>,
) -> impl IntoResponse {
    if request.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(SendResponse {
                accepted: false,
                pending: state.notifier.pending_count(),
            }),
        );
    }

    let accepted = if request.urgent {
        state.notifier.send_urgent(request.text)
    } else {
        state.notifier.send(request.text)
    };

    (
        StatusCode::ACCEPTED,
        Json(SendResponse {
            accepted,
            pending: state.notifier.pending_count(),
        }),
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .route("/messages", post(send_message))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
