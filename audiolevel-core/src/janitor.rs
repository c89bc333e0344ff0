//! Janitor
//!
//! Four independent periodic sweeps: retention-age eviction, orphan scratch
//! cleanup, Progress Bus heartbeat timeout, and stalled-job recovery. Each
//! runs on its own tokio interval task, spawned once at startup and held
//! for the life of the process.

use crate::progress::ProgressBus;
use crate::queue::JobQueue;
use audiolevel_common::JobId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const AGE_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const ORPHAN_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);
const HEARTBEAT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const STALLED_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const ORPHAN_MIN_AGE: Duration = Duration::from_secs(5 * 60);

pub struct Janitor {
    upload_dir: PathBuf,
    output_dir: PathBuf,
    retention: Duration,
    queue: Arc<JobQueue>,
    bus: ProgressBus,
}

impl Janitor {
    pub fn new(upload_dir: PathBuf, output_dir: PathBuf, retention: Duration, queue: Arc<JobQueue>, bus: ProgressBus) -> Self {
        Self { upload_dir, output_dir, retention, queue, bus }
    }

    /// Spawn all four sweeps as background tasks. Returns their handles so
    /// the caller can abort them on shutdown if desired.
    pub fn spawn(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let age_janitor = self.clone();
        let orphan_janitor = self.clone();
        let heartbeat_janitor = self.clone();
        let stalled_janitor = self.clone();

        vec![
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(AGE_SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    age_janitor.sweep_age().await;
                }
            }),
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(ORPHAN_SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    orphan_janitor.sweep_orphans().await;
                }
            }),
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(HEARTBEAT_SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    heartbeat_janitor.sweep_heartbeats().await;
                }
            }),
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(STALLED_SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    stalled_janitor.sweep_stalled().await;
                }
            }),
        ]
    }

    /// Delete regular files in the upload/output directories older than the
    /// retention window. Skips directories and anything not matching the
    /// expected `{jobId}-{input|output}.<ext>` shape's age check path.
    pub async fn sweep_age(&self) {
        for dir in [&self.upload_dir, &self.output_dir] {
            if let Err(err) = sweep_dir_by_age(dir, self.retention).await {
                warn!(?dir, %err, "age sweep failed for directory");
            }
        }
    }

    /// Delete `{jobId}-{input|output}.<ext>` files older than
    /// `ORPHAN_MIN_AGE` whose JobId the queue no longer knows about. Fails
    /// safe: a lookup error is treated as "the job exists".
    pub async fn sweep_orphans(&self) {
        for dir in [&self.upload_dir, &self.output_dir] {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(e) => e,
                Err(err) => {
                    warn!(?dir, %err, "orphan sweep failed to read directory");
                    continue;
                }
            };

            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                let Some(job_id) = extract_job_id(&path) else { continue };

                let Ok(metadata) = entry.metadata().await else { continue };
                let Ok(age) = metadata.modified().and_then(|m| m.elapsed().map_err(std::io::Error::other)) else { continue };
                if age < ORPHAN_MIN_AGE {
                    continue;
                }

                match self.queue.get(&job_id).await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        debug!(?path, "deleting orphaned scratch file");
                        let _ = tokio::fs::remove_file(&path).await;
                    }
                    Err(_) => {
                        // Fail safe: assume the job exists rather than
                        // delete under an uncertain lookup.
                    }
                }
            }
        }
    }

    pub async fn sweep_heartbeats(&self) {
        let closed = self.bus.sweep_idle().await;
        if !closed.is_empty() {
            debug!(count = closed.len(), "closed idle real-time sessions");
        }
    }

    /// Recover jobs the queue can't recover on its own: ones whose worker
    /// died mid-attempt (lease expired without release) and ones whose
    /// durable retry backoff has elapsed.
    pub async fn sweep_stalled(&self) {
        match self.queue.requeue_expired_leases().await {
            Ok(count) if count > 0 => debug!(count, "requeued jobs with expired leases"),
            Ok(_) => {}
            Err(err) => warn!(%err, "expired-lease sweep failed"),
        }
        match self.queue.requeue_due_delayed().await {
            Ok(count) if count > 0 => debug!(count, "requeued due delayed jobs"),
            Ok(_) => {}
            Err(err) => warn!(%err, "due-delayed sweep failed"),
        }
    }
}

async fn sweep_dir_by_age(dir: &Path, retention: Duration) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        if let Ok(age) = metadata.modified().and_then(|m| m.elapsed().map_err(std::io::Error::other)) {
            if age > retention {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }
    }
    Ok(())
}

fn extract_job_id(path: &Path) -> Option<JobId> {
    let stem = path.file_stem()?.to_str()?;
    let (id_part, _) = stem.split_once('-')?;
    JobId::parse(id_part).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_job_id_from_input_filename() {
        let id = JobId::generate();
        let path = PathBuf::from(format!("{id}-input.wav"));
        assert_eq!(extract_job_id(&path), Some(id));
    }

    #[test]
    fn rejects_malformed_filename() {
        assert_eq!(extract_job_id(&PathBuf::from("not-a-job-id.wav")), None);
    }
}
