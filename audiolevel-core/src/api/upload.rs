//! Upload admission endpoints: `POST /upload`, `GET /upload/rate-limit`,
//! `GET /upload/queue-status`.

use crate::admission::AdmissionError;
use crate::error::ApiError;
use crate::models::{Job, Priority};
use crate::AppState;
use audiolevel_common::JobId;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{routing::get, routing::post, Json, Router};
use serde::Serialize;

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::NoFile => ApiError::NoFile,
            AdmissionError::EmptyFile => ApiError::EmptyFile,
            AdmissionError::FileTooLarge => ApiError::FileTooLarge,
            AdmissionError::InvalidFileType => ApiError::InvalidFileType,
            AdmissionError::InvalidFormat => ApiError::InvalidFormat,
            AdmissionError::RateLimitExceeded { retry_after_secs } => ApiError::RateLimitExceeded { retry_after_secs },
            AdmissionError::QueueOverloaded => ApiError::QueueOverloaded,
            AdmissionError::InsufficientStorage => ApiError::InsufficientStorage,
            AdmissionError::Io(err) => ApiError::Io(err),
        }
    }
}

fn client_identifier(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            return first.trim().to_string();
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return real_ip.trim().to_string();
    }
    "unknown".to_string()
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: String,
    pub status: &'static str,
    pub output_format: String,
    pub original_name: String,
    pub estimated_wait_time: u64,
}

/// POST /upload
pub async fn upload(State(state): State<AppState>, headers: HeaderMap, mut multipart: Multipart) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let client_id = client_identifier(&headers);
    state.admission.check_rate_limit(&client_id).await?;

    let field = loop {
        match multipart.next_field().await.map_err(|e| ApiError::BadRequest(e.to_string()))? {
            Some(f) if f.name() == Some("file") => break Some(f),
            Some(_) => continue,
            None => break None,
        }
    };
    let field = field.ok_or(ApiError::NoFile)?;
    let original_name = field.file_name().unwrap_or("upload").to_string();

    let ext = state.admission.check_extension(&original_name)?;

    let job_id = JobId::generate();
    let input_path = state.config.upload_dir.join(format!("{job_id}-input.{ext}"));
    let output_path = state.config.output_dir.join(format!("{job_id}-output.{ext}"));

    let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let size = bytes.len() as u64;
    state.admission.check_size(size)?;
    state.admission.check_disk_space(&state.config.upload_dir, size)?;

    let priority = Priority::from_file_size(size);
    state.admission.check_queue_admits(priority).await?;

    tokio::fs::create_dir_all(&state.config.upload_dir).await?;
    tokio::fs::write(&input_path, &bytes).await?;

    state.admission.sniff_and_validate(&input_path).await?;

    let job = Job::new(job_id.clone(), input_path.display().to_string(), output_path.display().to_string(), original_name.clone(), size);
    state.queue.enqueue(job).await.map_err(|e| ApiError::Internal(e.to_string()))?;

    let health = state.queue.health(0, 0, 0, 0).await.map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            job_id: job_id.to_string(),
            status: "queued",
            output_format: ext,
            original_name,
            estimated_wait_time: health.estimated_wait_secs,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct RateLimitResponse {
    pub limit: u64,
    pub remaining: u64,
    pub used: u64,
    pub reset_at: i64,
    pub window_ms: i64,
}

/// GET /upload/rate-limit
///
/// The limiter's only primitive (`rate_limit_check`) both counts and
/// admits in one atomic step, so there is no non-consuming way to peek a
/// caller's remaining quota without spending it. This reports the
/// configured policy envelope rather than guessing at live usage.
pub async fn rate_limit_status(State(state): State<AppState>, _headers: HeaderMap) -> Json<RateLimitResponse> {
    let limit = state.admission.rate_limit_max();
    let window_ms = state.admission.rate_limit_window_ms();
    Json(RateLimitResponse {
        limit,
        remaining: limit,
        used: 0,
        reset_at: 0,
        window_ms,
    })
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub status: crate::queue::QueueHealthStatus,
    pub accepting_jobs: bool,
    pub estimated_wait_time: u64,
    pub waiting: u64,
    pub active: u64,
}

/// GET /upload/queue-status
pub async fn queue_status(State(state): State<AppState>) -> Result<Json<QueueStatusResponse>, ApiError> {
    let health = state.queue.health(0, 0, 0, 0).await.map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(QueueStatusResponse {
        accepting_jobs: !matches!(health.status, crate::queue::QueueHealthStatus::Overloaded),
        estimated_wait_time: health.estimated_wait_secs,
        waiting: health.waiting,
        active: health.active,
        status: health.status,
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/upload/rate-limit", get(rate_limit_status))
        .route("/upload/queue-status", get(queue_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_identifier_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 5.6.7.8".parse().unwrap());
        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        assert_eq!(client_identifier(&headers), "1.2.3.4");
    }

    #[test]
    fn client_identifier_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        assert_eq!(client_identifier(&headers), "9.9.9.9");
    }

    #[test]
    fn client_identifier_falls_back_to_unknown() {
        let headers = HeaderMap::new();
        assert_eq!(client_identifier(&headers), "unknown");
    }
}
