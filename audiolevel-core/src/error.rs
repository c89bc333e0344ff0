//! API error taxonomy
//!
//! Maps the error kinds in the control-plane design (input, admission,
//! processing, timeout, not-found, infrastructure) onto HTTP status codes
//! and the stable string codes the upload/job endpoints promise callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no file provided")]
    NoFile,
    #[error("uploaded file is empty")]
    EmptyFile,
    #[error("file exceeds maximum size")]
    FileTooLarge,
    #[error("file extension not allowed")]
    InvalidFileType,
    #[error("file content does not match an allowed media type")]
    InvalidFormat,
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },
    #[error("queue is overloaded")]
    QueueOverloaded,
    #[error("insufficient storage")]
    InsufficientStorage,
    #[error("invalid job id")]
    InvalidJobId,
    #[error("job not found")]
    JobNotFound,
    #[error("job is not ready for download")]
    NotReady,
    #[error("file has expired")]
    FileExpired,

    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
    #[error("common error: {0}")]
    Common(#[from] audiolevel_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        use ApiError::*;
        match self {
            NoFile => (StatusCode::BAD_REQUEST, "NO_FILE"),
            EmptyFile => (StatusCode::BAD_REQUEST, "EMPTY_FILE"),
            FileTooLarge => (StatusCode::BAD_REQUEST, "FILE_TOO_LARGE"),
            InvalidFileType => (StatusCode::BAD_REQUEST, "INVALID_FILE_TYPE"),
            InvalidFormat => (StatusCode::BAD_REQUEST, "INVALID_FORMAT"),
            RateLimitExceeded { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
            QueueOverloaded => (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_OVERLOADED"),
            InsufficientStorage => (StatusCode::SERVICE_UNAVAILABLE, "INSUFFICIENT_STORAGE"),
            InvalidJobId => (StatusCode::BAD_REQUEST, "INVALID_JOB_ID"),
            JobNotFound => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND"),
            NotReady => (StatusCode::BAD_REQUEST, "NOT_READY"),
            FileExpired => (StatusCode::NOT_FOUND, "FILE_EXPIRED"),
            BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = self.to_string();
        let mut response = (
            status,
            Json(json!({
                "error": { "code": code, "message": message }
            })),
        )
            .into_response();

        if let ApiError::RateLimitExceeded { retry_after_secs } = self {
            response
                .headers_mut()
                .insert("Retry-After", retry_after_secs.into());
        }
        response
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
