//! AudioLevel control plane library interface
//!
//! Exposes the queue, worker pool, progress bus, and HTTP layer for the
//! binary entrypoint and for integration testing.

pub mod admission;
pub mod api;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod generator;
pub mod janitor;
pub mod kvstore;
pub mod models;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod queue;
pub mod runner;
pub mod worker;

pub use crate::error::{ApiError, ApiResult};

use crate::admission::AdmissionController;
use crate::config::AppConfig;
use crate::kvstore::KvStore;
use crate::progress::ProgressBus;
use crate::queue::JobQueue;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn KvStore>,
    pub queue: Arc<JobQueue>,
    pub admission: Arc<AdmissionController>,
    pub bus: ProgressBus,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn KvStore>) -> Self {
        let queue = Arc::new(JobQueue::new(store.clone(), config.max_concurrent_jobs));
        let admission = Arc::new(AdmissionController::new(queue.clone(), store.clone(), config.max_file_size));
        Self {
            config: Arc::new(config),
            store,
            queue,
            admission,
            bus: ProgressBus::new(),
            startup_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.startup_time).num_seconds().max(0)
    }
}

/// Build the application router: health, upload/job control plane, and the
/// real-time progress socket.
pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .merge(api::health::routes())
        .merge(api::upload::routes())
        .merge(api::job::routes())
        .merge(api::ws::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
