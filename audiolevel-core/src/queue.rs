//! Job Queue
//!
//! Priority FIFO backed by the external KV store: one sorted set per
//! priority tier, scored by enqueue timestamp so within a tier jobs are
//! served FIFO. Dequeue pops the highest-priority non-empty tier. Job
//! records themselves are stored as JSON blobs keyed by JobId.

use crate::kvstore::{KvStore, StoreError};
use crate::models::{Job, JobState, Priority};
use audiolevel_common::JobId;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const JOB_KEY_PREFIX: &str = "audiolevel:job:";
const QUEUE_KEY_PREFIX: &str = "audiolevel:queue:";
const LEASE_KEY_PREFIX: &str = "audiolevel:lease:";
const LEASE_TTL_SECS: u64 = 120;
/// Sorted set of active job ids scored by lease expiry (epoch seconds),
/// scanned by `requeue_expired_leases` to find jobs whose worker died
/// mid-attempt.
const ACTIVE_SET_KEY: &str = "audiolevel:active";
/// Sorted set of delayed job ids scored by retry-due time (epoch seconds),
/// scanned by `requeue_due_delayed` so a retry survives a process restart.
const DELAYED_SET_KEY: &str = "audiolevel:delayed";

/// Queue-depth thresholds that drive admission gating and the derived
/// health status.
pub const WARNING_THRESHOLD: u64 = 10;
pub const OVERLOADED_THRESHOLD: u64 = 50;
const MEAN_PROCESSING_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueHealthStatus {
    Normal,
    Warning,
    Overloaded,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueHealth {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub status: QueueHealthStatus,
    pub estimated_wait_secs: u64,
}

pub struct JobQueue {
    store: Arc<dyn KvStore>,
    max_concurrent: usize,
}

fn job_key(job_id: &JobId) -> String {
    format!("{JOB_KEY_PREFIX}{job_id}")
}

fn queue_key(priority: Priority) -> String {
    format!("{QUEUE_KEY_PREFIX}{}", priority.queue_suffix())
}

fn lease_key(job_id: &JobId) -> String {
    format!("{LEASE_KEY_PREFIX}{job_id}")
}

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs_f64()
}

impl JobQueue {
    pub fn new(store: Arc<dyn KvStore>, max_concurrent: usize) -> Self {
        Self { store, max_concurrent }
    }

    /// Persist a new job and enqueue it into its priority tier.
    pub async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let key = job_key(&job.job_id);
        let payload = serde_json::to_string(&job)?;
        self.store.set(&key, &payload).await?;
        self.store.zadd(&queue_key(job.priority), job.job_id.as_str(), now_secs()).await?;
        Ok(())
    }

    /// Pop the next job from the highest-priority non-empty tier.
    pub async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        for priority in Priority::all() {
            if let Some((job_id_str, _)) = self.store.zpopmin(&queue_key(priority)).await? {
                let job_id = JobId::parse(&job_id_str).map_err(|_| QueueError::NotFound(job_id_str.clone()))?;
                let mut job = self.get(&job_id).await?.ok_or(QueueError::NotFound(job_id_str))?;
                job.mark_active();
                self.save(&job).await?;
                self.refresh_lease(&job.job_id).await?;
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    pub async fn get(&self, job_id: &JobId) -> Result<Option<Job>, QueueError> {
        match self.store.get(&job_key(job_id)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, job: &Job) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        self.store.set(&job_key(&job.job_id), &payload).await?;
        Ok(())
    }

    /// Refresh the lease that marks a job as actively owned by a worker;
    /// stalled detection relies on this TTL expiring when a worker dies.
    /// Also bumps the job's score in the active-job set so
    /// `requeue_expired_leases` tracks the same expiry the store TTL does.
    pub async fn refresh_lease(&self, job_id: &JobId) -> Result<(), QueueError> {
        self.store.set_with_ttl(&lease_key(job_id), "1", LEASE_TTL_SECS).await?;
        self.store.zadd(ACTIVE_SET_KEY, job_id.as_str(), now_secs() + LEASE_TTL_SECS as f64).await?;
        Ok(())
    }

    pub async fn release_lease(&self, job_id: &JobId) -> Result<(), QueueError> {
        self.store.delete(&lease_key(job_id)).await?;
        self.store.zrem(ACTIVE_SET_KEY, job_id.as_str()).await?;
        Ok(())
    }

    pub async fn has_lease(&self, job_id: &JobId) -> Result<bool, QueueError> {
        Ok(self.store.exists(&lease_key(job_id)).await?)
    }

    /// Track a delayed job's retry-due time durably, so the retry survives
    /// a process restart instead of depending on an in-memory timer.
    pub async fn track_delayed(&self, job_id: &JobId, due_at_secs: f64) -> Result<(), QueueError> {
        self.store.zadd(DELAYED_SET_KEY, job_id.as_str(), due_at_secs).await?;
        Ok(())
    }

    /// Re-enqueue a job whose worker appears dead (lease expired with no
    /// terminal state) or whose delayed retry is due, for another attempt.
    pub async fn requeue_stalled(&self, job: &mut Job) -> Result<(), QueueError> {
        job.state = JobState::Waiting;
        job.retry_due_at = None;
        self.save(job).await?;
        self.store.zadd(&queue_key(job.priority), job.job_id.as_str(), now_secs()).await?;
        self.store.zrem(ACTIVE_SET_KEY, job.job_id.as_str()).await?;
        self.store.zrem(DELAYED_SET_KEY, job.job_id.as_str()).await?;
        Ok(())
    }

    /// Scan the active-job set for leases that expired without being
    /// refreshed or released — the worker holding them died mid-attempt —
    /// and requeue them. `has_lease` is re-checked before requeuing to
    /// close the race where a refresh landed between the score check and
    /// now. Returns the number of jobs requeued.
    pub async fn requeue_expired_leases(&self) -> Result<u64, QueueError> {
        let now = now_secs();
        let mut requeued = 0;
        loop {
            let Some((job_id_str, expires_at)) = self.store.zpopmin(ACTIVE_SET_KEY).await? else { break };
            if expires_at > now {
                self.store.zadd(ACTIVE_SET_KEY, &job_id_str, expires_at).await?;
                break;
            }
            let Ok(job_id) = JobId::parse(&job_id_str) else { continue };
            if self.has_lease(&job_id).await? {
                // Refreshed between the score check and now; put it back.
                self.store.zadd(ACTIVE_SET_KEY, &job_id_str, now + LEASE_TTL_SECS as f64).await?;
                continue;
            }
            if let Some(mut job) = self.get(&job_id).await? {
                if job.state == JobState::Active {
                    self.requeue_stalled(&mut job).await?;
                    requeued += 1;
                }
            }
        }
        Ok(requeued)
    }

    /// Scan the delayed-job set for retries whose due time has passed and
    /// requeue them. Returns the number of jobs requeued.
    pub async fn requeue_due_delayed(&self) -> Result<u64, QueueError> {
        self.drain_due_set(DELAYED_SET_KEY, JobState::Delayed).await
    }

    /// Pop entries from a sorted set while their score is in the past,
    /// requeuing any whose job is still in `expected_state`. Stops as soon
    /// as it pops an entry not yet due, pushing it back unchanged.
    async fn drain_due_set(&self, set_key: &str, expected_state: JobState) -> Result<u64, QueueError> {
        let now = now_secs();
        let mut requeued = 0;
        loop {
            let Some((job_id_str, due_at)) = self.store.zpopmin(set_key).await? else { break };
            if due_at > now {
                self.store.zadd(set_key, &job_id_str, due_at).await?;
                break;
            }
            let Ok(job_id) = JobId::parse(&job_id_str) else { continue };
            if let Some(mut job) = self.get(&job_id).await? {
                if job.state == expected_state {
                    self.requeue_stalled(&mut job).await?;
                    requeued += 1;
                }
            }
        }
        Ok(requeued)
    }

    pub async fn waiting_count(&self) -> Result<u64, QueueError> {
        let mut total = 0;
        for priority in Priority::all() {
            total += self.store.zcard(&queue_key(priority)).await?;
        }
        Ok(total)
    }

    /// `waiting` threshold gate: in `warning`, only HIGH/NORMAL are
    /// admitted; in `overloaded`, nothing is admitted.
    pub async fn admits(&self, priority: Priority) -> Result<bool, QueueError> {
        let waiting = self.waiting_count().await?;
        if waiting >= OVERLOADED_THRESHOLD {
            return Ok(false);
        }
        if waiting >= WARNING_THRESHOLD {
            return Ok(matches!(priority, Priority::High | Priority::Normal));
        }
        Ok(true)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub async fn health(&self, active: u64, completed: u64, failed: u64, delayed: u64) -> Result<QueueHealth, QueueError> {
        let waiting = self.waiting_count().await?;
        let status = if waiting >= OVERLOADED_THRESHOLD {
            QueueHealthStatus::Overloaded
        } else if waiting >= WARNING_THRESHOLD {
            QueueHealthStatus::Warning
        } else {
            QueueHealthStatus::Normal
        };
        let estimated_wait_secs = ((waiting as f64 / self.max_concurrent.max(1) as f64).ceil() as u64) * MEAN_PROCESSING_SECS;

        Ok(QueueHealth { waiting, active, completed, failed, delayed, status, estimated_wait_secs })
    }
}
