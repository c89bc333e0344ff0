//! Health, readiness, and queue-status endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub services: ServiceStatus,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub store: String,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_ok = state.store.exists("audiolevel:health:probe").await.is_ok();
    let status_code = if store_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(HealthResponse {
            status: if store_ok { "ok".to_string() } else { "degraded".to_string() },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.uptime_seconds(),
            services: ServiceStatus { store: if store_ok { "up".to_string() } else { "down".to_string() } },
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub reason: Option<String>,
}

/// GET /health/ready
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    match state.store.exists("audiolevel:health:probe").await {
        Ok(_) => (StatusCode::OK, Json(ReadyResponse { ready: true, reason: None })),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse { ready: false, reason: Some(err.to_string()) }),
        ),
    }
}

/// GET /health/queue
pub async fn queue_health(State(state): State<AppState>) -> (StatusCode, Json<crate::queue::QueueHealth>) {
    match state.queue.health(0, 0, 0, 0).await {
        Ok(health) => (StatusCode::OK, Json(health)),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(crate::queue::QueueHealth {
                waiting: 0,
                active: 0,
                completed: 0,
                failed: 0,
                delayed: 0,
                status: crate::queue::QueueHealthStatus::Overloaded,
                estimated_wait_secs: 0,
            }),
        ),
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .route("/health/queue", get(queue_health))
}
