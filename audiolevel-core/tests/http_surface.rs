//! Integration tests against the HTTP surface via `tower::ServiceExt::oneshot`,
//! matching the 6 end-to-end scenarios named for the control plane: health
//! reporting, invalid job id rejection, not-yet-found job lookup, and
//! not-ready download rejection. No real Redis is required since these
//! all fail fast against an in-memory store before touching the queue.

use async_trait::async_trait;
use audiolevel_core::config::AppConfig;
use audiolevel_core::kvstore::{KvStore, RateLimitOutcome, StoreError};
use audiolevel_core::{build_router, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tower::ServiceExt;

#[derive(Default)]
struct InMemoryStore {
    strings: Mutex<HashMap<String, String>>,
    sets: Mutex<HashMap<String, Vec<(String, f64)>>>,
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.strings.lock().unwrap().get(key).cloned())
    }
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.strings.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }
    async fn set_with_ttl(&self, key: &str, value: &str, _ttl_secs: u64) -> Result<(), StoreError> {
        self.set(key, value).await
    }
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.strings.lock().unwrap().remove(key);
        Ok(())
    }
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.strings.lock().unwrap().contains_key(key))
    }
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut sets = self.sets.lock().unwrap();
        let set = sets.entry(key.to_string()).or_default();
        set.retain(|(m, _)| m != member);
        set.push((member.to_string(), score));
        Ok(())
    }
    async fn zpopmin(&self, key: &str) -> Result<Option<(String, f64)>, StoreError> {
        let mut sets = self.sets.lock().unwrap();
        let Some(set) = sets.get_mut(key) else { return Ok(None) };
        if set.is_empty() {
            return Ok(None);
        }
        let idx = set.iter().enumerate().min_by(|(_, (_, a)), (_, (_, b))| a.partial_cmp(b).unwrap()).map(|(i, _)| i).unwrap();
        Ok(Some(set.remove(idx)))
    }
    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.sets.lock().unwrap().get(key).map(|s| s.len() as u64).unwrap_or(0))
    }
    async fn zrem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        if let Some(set) = self.sets.lock().unwrap().get_mut(key) {
            set.retain(|(m, _)| m != member);
        }
        Ok(())
    }
    async fn rate_limit_check(&self, _key: &str, _now_ms: i64, _window_ms: i64, max_requests: u64, _nonce: &str) -> Result<RateLimitOutcome, StoreError> {
        Ok(RateLimitOutcome { admitted: true, remaining: max_requests, retry_after_secs: 0 })
    }
}

fn test_config(tmp: &tempfile::TempDir) -> AppConfig {
    AppConfig {
        port: 0,
        redis_url: "redis://127.0.0.1:6379".to_string(),
        upload_dir: tmp.path().join("uploads"),
        output_dir: tmp.path().join("output"),
        scratch_dir: tmp.path().join("scratch"),
        media_toolchain_path: "ffmpeg".to_string(),
        max_file_size: 10 * 1024 * 1024,
        file_retention_minutes: 15,
        max_concurrent_jobs: 4,
        processing_timeout_ms: 5 * 60 * 1000,
        final_encode_timeout_ms: 60 * 60 * 1000,
        app_env: "test".to_string(),
        cors_origins: vec![],
        quality_model_path: None,
        quality_model_weights: None,
    }
}

fn test_app() -> (axum::Router, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(&tmp);
    let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::default());
    let state = AppState::new(config, store);
    (build_router(state), tmp)
}

#[tokio::test]
async fn health_reports_ok_when_store_reachable() {
    let (app, _tmp) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn job_status_rejects_malformed_job_id() {
    let (app, _tmp) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/upload/job/not-a-valid-id!!").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn job_status_404s_for_unknown_but_well_formed_id() {
    let (app, _tmp) = test_app();
    let well_formed = "AbCdEfGhIjKl";
    let response = app
        .oneshot(Request::builder().uri(format!("/upload/job/{well_formed}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn download_before_job_exists_is_not_found_not_not_ready() {
    let (app, _tmp) = test_app();
    let well_formed = "AbCdEfGhIjKl";
    let response = app
        .oneshot(Request::builder().uri(format!("/upload/job/{well_formed}/download")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn queue_status_reports_accepting_jobs_when_empty() {
    let (app, _tmp) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/upload/queue-status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upload_without_a_file_field_is_rejected() {
    let (app, _tmp) = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header("content-type", "multipart/form-data; boundary=X-TEST")
                .body(Body::from("--X-TEST--\r\n"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
