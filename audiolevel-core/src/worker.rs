//! Worker Pool
//!
//! A bounded set of workers, each pinned to one Job at a time, dequeuing
//! from the `JobQueue` and driving `pipeline::run_attempt` to completion.
//! On success the job is marked completed and a `complete` frame is
//! published; on failure with attempts remaining it is delayed with
//! exponential backoff; on exhaustion it is marked failed.

use crate::models::{Job, JobResult};
use crate::pipeline::{self, PipelineError, Stage};
use crate::progress::{ProgressBus, ServerFrame};
use crate::queue::JobQueue;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct WorkerPoolConfig {
    pub max_concurrent: usize,
    pub media_toolchain_path: String,
    pub scratch_root: PathBuf,
    pub candidate_timeout: Duration,
    pub final_encode_timeout: Duration,
    pub quality_model_path: Option<PathBuf>,
    pub quality_model_weights: Option<PathBuf>,
}

pub struct WorkerPool {
    queue: Arc<JobQueue>,
    bus: ProgressBus,
    config: WorkerPoolConfig,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(queue: Arc<JobQueue>, bus: ProgressBus, config: WorkerPoolConfig, shutdown: CancellationToken) -> Self {
        Self { queue, bus, config, shutdown }
    }

    /// Spawn `max_concurrent` worker loops. Each loop polls the queue for
    /// work; an empty queue backs off briefly rather than busy-spinning.
    pub fn spawn(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.max_concurrent)
            .map(|worker_index| {
                let pool = self.clone();
                tokio::spawn(async move { pool.run_loop(worker_index).await })
            })
            .collect()
    }

    async fn run_loop(&self, worker_index: usize) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }

            match self.queue.dequeue().await {
                Ok(Some(job)) => self.process_job(worker_index, job).await,
                Ok(None) => tokio::time::sleep(Duration::from_millis(250)).await,
                Err(err) => {
                    warn!(worker_index, %err, "dequeue failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn process_job(&self, worker_index: usize, mut job: Job) {
        info!(worker_index, job_id = %job.job_id, "picked up job");
        let job_id = job.job_id.clone();
        let scratch_dir = self.config.scratch_root.join(format!("job-{job_id}"));
        if let Err(err) = tokio::fs::create_dir_all(&scratch_dir).await {
            error!(%job_id, %err, "failed to create scratch directory");
            job.mark_failed(format!("scratch directory creation failed: {err}"));
            let _ = self.queue.save(&job).await;
            return;
        }

        let bus = self.bus.clone();
        let job_id_for_progress = job_id.clone();
        let on_progress = std::sync::Arc::new(move |stage: Stage| {
            let bus = bus.clone();
            let job_id = job_id_for_progress.clone();
            let percent = stage.progress_percent();
            tokio::spawn(async move {
                bus.publish(
                    &job_id,
                    ServerFrame::Progress { job_id: job_id.to_string(), percent, stage: Some(format!("{stage:?}")) },
                )
                .await;
            });
        });

        let cancel = CancellationToken::new();
        let lease_job_id = job_id.clone();
        let queue_for_lease = self.queue.clone();
        let lease_cancel = cancel.clone();
        let lease_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {
                        let _ = queue_for_lease.refresh_lease(&lease_job_id).await;
                    }
                    _ = lease_cancel.cancelled() => return,
                }
            }
        });

        let result = pipeline::run_attempt(
            &self.config.media_toolchain_path,
            &std::path::PathBuf::from(&job.input_path),
            &std::path::PathBuf::from(&job.output_path),
            &scratch_dir,
            self.config.candidate_timeout,
            self.config.final_encode_timeout,
            self.config.quality_model_path.as_deref(),
            self.config.quality_model_weights.as_deref(),
            cancel.clone(),
            Some(on_progress),
        )
        .await;

        cancel.cancel();
        lease_task.abort();
        let _ = self.queue.release_lease(&job_id).await;

        match result {
            Ok(outcome) => self.finish_success(&mut job, outcome.result).await,
            Err(err) => self.finish_failure(&mut job, err).await,
        }

        let _ = tokio::fs::remove_dir_all(&scratch_dir).await;
    }

    async fn finish_success(&self, job: &mut Job, result: JobResult) {
        let download_url = format!("/upload/job/{}/download", job.job_id);
        job.mark_completed(result);
        let _ = self.queue.save(job).await;
        self.bus
            .publish(
                &job.job_id,
                ServerFrame::Complete { job_id: job.job_id.to_string(), download_url, metrics: None },
            )
            .await;
        info!(job_id = %job.job_id, "job completed");
    }

    /// On exhaustion the job is marked terminally failed. Otherwise it is
    /// saved `Delayed` with a durable `retry_due_at` and tracked in the
    /// queue's delayed-job set; the Janitor's stalled-job sweep is what
    /// actually requeues it once due, so the retry survives a process
    /// restart rather than depending on an in-memory timer.
    async fn finish_failure(&self, job: &mut Job, err: PipelineError) {
        warn!(job_id = %job.job_id, %err, "job attempt failed");
        if job.attempts_exhausted() {
            job.mark_failed(err.to_string());
            let _ = self.queue.save(job).await;
            self.bus
                .publish(&job.job_id, ServerFrame::Error { message: err.to_string(), code: Some("PROCESSING_FAILED".to_string()) })
                .await;
        } else {
            job.mark_delayed(err.to_string());
            let _ = self.queue.save(job).await;
            if let Some(due_at) = job.retry_due_epoch_secs() {
                let _ = self.queue.track_delayed(&job.job_id, due_at).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_pool_config_holds_given_concurrency() {
        let config = WorkerPoolConfig {
            max_concurrent: 4,
            media_toolchain_path: "ffmpeg".to_string(),
            scratch_root: PathBuf::from("/tmp"),
            candidate_timeout: Duration::from_secs(300),
            final_encode_timeout: Duration::from_secs(3600),
            quality_model_path: None,
            quality_model_weights: None,
        };
        assert_eq!(config.max_concurrent, 4);
    }
}
