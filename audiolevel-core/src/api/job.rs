//! Job status and artifact download endpoints.

use crate::error::ApiError;
use crate::models::JobState;
use crate::AppState;
use audiolevel_common::JobId;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::path::Path as StdPath;

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<crate::models::job::JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /upload/job/:id
pub async fn job_status(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<JobStatusResponse>, ApiError> {
    let job_id = JobId::parse(&id).map_err(|_| ApiError::InvalidJobId)?;
    let job = state
        .queue
        .get(&job_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::JobNotFound)?;

    Ok(Json(JobStatusResponse {
        job_id: job.job_id.to_string(),
        status: job.state,
        progress: job.progress,
        result: job.result,
        error: job.failed_reason,
    }))
}

/// Sanitize a download filename per the download-contract rule: drop the
/// original extension, replace anything outside `[A-Za-z0-9._-]` with `_`,
/// strip leading dots, truncate to 200 chars, then append the output
/// extension and the `-normalized` marker.
pub fn sanitize_download_filename(original_name: &str, output_ext: &str) -> String {
    let stem = StdPath::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    let mut sanitized: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '_' })
        .collect();

    while sanitized.starts_with('.') {
        sanitized.remove(0);
    }
    if sanitized.is_empty() {
        sanitized = "output".to_string();
    }
    sanitized.truncate(200);

    format!("{sanitized}-normalized.{output_ext}")
}

/// GET /upload/job/:id/download
pub async fn job_download(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let job_id = JobId::parse(&id).map_err(|_| ApiError::InvalidJobId)?;
    let job = state
        .queue
        .get(&job_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::JobNotFound)?;

    if job.state != JobState::Completed {
        return Err(ApiError::NotReady);
    }
    let result = job.result.as_ref().ok_or(ApiError::NotReady)?;

    let output_path = StdPath::new(&result.output_path);
    let ext = output_path.extension().and_then(|e| e.to_str()).unwrap_or("wav");

    let file = match tokio::fs::File::open(output_path).await {
        Ok(file) => file,
        Err(_) => return Err(ApiError::FileExpired),
    };

    let filename = sanitize_download_filename(&job.original_name, ext);
    let stream = tokio_util::io::ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\""))
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(response.into_response())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload/job/:id", get(job_status))
        .route("/upload/job/:id/download", get(job_download))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_disallowed_characters() {
        let name = sanitize_download_filename("my song!@#.mp3", "wav");
        assert_eq!(name, "my_song___-normalized.wav");
    }

    #[test]
    fn strips_leading_dots() {
        let name = sanitize_download_filename("...hidden.mp3", "wav");
        assert_eq!(name, "hidden-normalized.wav");
    }

    #[test]
    fn truncates_long_stems() {
        let long_name = format!("{}.mp3", "a".repeat(300));
        let name = sanitize_download_filename(&long_name, "wav");
        let stem_len = name.len() - "-normalized.wav".len();
        assert_eq!(stem_len, 200);
    }

    #[test]
    fn empty_stem_falls_back_to_output() {
        let name = sanitize_download_filename(".mp3", "wav");
        assert_eq!(name, "output-normalized.wav");
    }
}
