//! Admission Controller
//!
//! Runs every check named in spec.md §4.11 before a job is allowed to enter
//! the queue: size, disk space, queue depth, extension allow-list,
//! content-sniff, and client rate limiting. Nothing here touches the queue's
//! own internal state beyond asking it whether it currently admits a given
//! priority.

use crate::kvstore::KvStore;
use crate::models::Priority;
use crate::queue::JobQueue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const ALLOWED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma", "opus", "mp4", "mov", "mkv", "webm"];
const SNIFF_WINDOW_BYTES: usize = 8192;
const DISK_OVERHEAD_FACTOR: u64 = 3;
const DEFAULT_RATE_LIMIT_MAX: u64 = 10;
const DEFAULT_RATE_LIMIT_WINDOW_MS: i64 = 15 * 60 * 1000;

#[derive(Debug, Error)]
pub enum AdmissionError {
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
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct AdmissionController {
    queue: Arc<JobQueue>,
    store: Arc<dyn KvStore>,
    max_file_size: u64,
    rate_limit_max: u64,
    rate_limit_window_ms: i64,
    /// Bytes currently reserved by in-flight uploads not yet durably on disk,
    /// so a burst of concurrent admissions can't all pass the same disk-free
    /// snapshot.
    reserved_bytes: Arc<std::sync::atomic::AtomicU64>,
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

impl AdmissionController {
    pub fn new(queue: Arc<JobQueue>, store: Arc<dyn KvStore>, max_file_size: u64) -> Self {
        Self {
            queue,
            store,
            max_file_size,
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            rate_limit_window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            reserved_bytes: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    pub fn rate_limit_max(&self) -> u64 {
        self.rate_limit_max
    }

    pub fn rate_limit_window_ms(&self) -> i64 {
        self.rate_limit_window_ms
    }

    /// Atomic sliding-window rate-limit check against `client_id`. Fails
    /// open (admits) if the store is unreachable so a dead counter never
    /// produces a total outage.
    pub async fn check_rate_limit(&self, client_id: &str) -> Result<(), AdmissionError> {
        let key = format!("audiolevel:ratelimit:{client_id}");
        let nonce: String = uuid_like_nonce();
        match self
            .store
            .rate_limit_check(&key, now_ms(), self.rate_limit_window_ms, self.rate_limit_max, &nonce)
            .await
        {
            Ok(outcome) if outcome.admitted => Ok(()),
            Ok(outcome) => Err(AdmissionError::RateLimitExceeded { retry_after_secs: outcome.retry_after_secs }),
            Err(_) => Ok(()),
        }
    }

    pub fn check_extension(&self, filename: &str) -> Result<String, AdmissionError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or(AdmissionError::InvalidFileType)?;
        if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            Ok(ext)
        } else {
            Err(AdmissionError::InvalidFileType)
        }
    }

    pub fn check_size(&self, size: u64) -> Result<(), AdmissionError> {
        if size == 0 {
            return Err(AdmissionError::EmptyFile);
        }
        if size > self.max_file_size {
            return Err(AdmissionError::FileTooLarge);
        }
        Ok(())
    }

    /// Disk-space check: free space must cover this file plus every other
    /// in-flight reservation, multiplied by an overhead factor for scratch
    /// and final-encode artifacts.
    pub fn check_disk_space(&self, upload_dir: &Path, incoming_size: u64) -> Result<(), AdmissionError> {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        let free_bytes = disks
            .iter()
            .filter(|d| upload_dir.starts_with(d.mount_point()))
            .map(|d| d.available_space())
            .max()
            .unwrap_or(u64::MAX);

        let reserved = self.reserved_bytes.load(std::sync::atomic::Ordering::SeqCst);
        let required = (incoming_size + reserved).saturating_mul(DISK_OVERHEAD_FACTOR);

        if free_bytes < required {
            return Err(AdmissionError::InsufficientStorage);
        }
        Ok(())
    }

    pub async fn check_queue_admits(&self, priority: Priority) -> Result<(), AdmissionError> {
        match self.queue.admits(priority).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AdmissionError::QueueOverloaded),
            Err(_) => Err(AdmissionError::QueueOverloaded),
        }
    }

    pub fn reserve(&self, bytes: u64) -> ReservationGuard {
        self.reserved_bytes.fetch_add(bytes, std::sync::atomic::Ordering::SeqCst);
        ReservationGuard { bytes, reserved: self.reserved_bytes.clone() }
    }

    /// Content-sniff the first `SNIFF_WINDOW_BYTES` of a written upload. The
    /// detected type must either be in the extension allow-list's media
    /// family or belong to `audio/*`/`video/*` broadly, since legitimate
    /// audio sometimes arrives in a video container.
    pub async fn sniff_and_validate(&self, path: &Path) -> Result<(), AdmissionError> {
        let bytes = tokio::fs::read(path).await?;
        let window = &bytes[..bytes.len().min(SNIFF_WINDOW_BYTES)];

        let matches = match infer::get(window) {
            Some(kind) => {
                let mime = kind.mime_type();
                mime.starts_with("audio/") || mime.starts_with("video/")
            }
            None => false,
        };

        if !matches {
            let _ = tokio::fs::remove_file(path).await;
            return Err(AdmissionError::InvalidFormat);
        }
        Ok(())
    }
}

/// Releases a disk-space reservation when an upload finishes landing on
/// disk (success or failure).
pub struct ReservationGuard {
    bytes: u64,
    reserved: Arc<std::sync::atomic::AtomicU64>,
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        self.reserved.fetch_sub(self.bytes, std::sync::atomic::Ordering::SeqCst);
    }
}

fn uuid_like_nonce() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..16).map(|_| format!("{:x}", rng.gen_range(0..16))).collect()
}

/// Stream an upload body to `dest` without buffering it fully in memory,
/// returning the total byte count written.
pub async fn stream_to_disk<S, E>(dest: &PathBuf, mut stream: S) -> std::io::Result<u64>
where
    S: futures::Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(dest).await?;
    let mut total = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        file.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(total)
}
