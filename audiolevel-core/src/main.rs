//! AudioLevel control-plane binary.
//!
//! Loads configuration from the environment, connects to the backing KV
//! store, starts the Worker Pool and Janitor as background tasks, and
//! serves the HTTP/WebSocket surface until the process receives a shutdown
//! signal.

use anyhow::{Context, Result};
use audiolevel_core::config::AppConfig;
use audiolevel_core::janitor::Janitor;
use audiolevel_core::kvstore::{KvStore, RedisStore};
use audiolevel_core::worker::{WorkerPool, WorkerPoolConfig};
use audiolevel_core::{build_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env();
    init_tracing(&config);

    info!("starting AudioLevel");
    info!(port = config.port, redis_url = %config.redis_url, "configuration loaded");

    let store: Arc<dyn KvStore> = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .context("connecting to the key/value store")?,
    );

    tokio::fs::create_dir_all(&config.upload_dir).await.context("creating upload directory")?;
    tokio::fs::create_dir_all(&config.output_dir).await.context("creating output directory")?;
    tokio::fs::create_dir_all(&config.scratch_dir).await.context("creating scratch directory")?;

    let state = AppState::new(config.clone(), store);

    let shutdown = CancellationToken::new();
    let worker_pool = Arc::new(WorkerPool::new(
        state.queue.clone(),
        state.bus.clone(),
        WorkerPoolConfig {
            max_concurrent: config.max_concurrent_jobs,
            media_toolchain_path: config.media_toolchain_path.clone(),
            scratch_root: config.scratch_dir.clone(),
            candidate_timeout: Duration::from_millis(config.processing_timeout_ms),
            final_encode_timeout: Duration::from_millis(config.final_encode_timeout_ms),
            quality_model_path: config.quality_model_path.clone(),
            quality_model_weights: config.quality_model_weights.clone(),
        },
        shutdown.clone(),
    ));
    let worker_handles = worker_pool.spawn();
    info!(workers = worker_handles.len(), "worker pool started");

    let janitor = Arc::new(Janitor::new(
        config.upload_dir.clone(),
        config.output_dir.clone(),
        Duration::from_secs(config.file_retention_minutes * 60),
        state.queue.clone(),
        state.bus.clone(),
    ));
    let janitor_handles = janitor.spawn();
    info!(sweeps = janitor_handles.len(), "janitor started");

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.context("binding listener")?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    shutdown.cancel();
    for handle in worker_handles.into_iter().chain(janitor_handles) {
        handle.abort();
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.is_pretty_logging() {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
