//! Job lifecycle state machine

use super::evaluation::EvaluationScore;
use audiolevel_common::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue priority, derived from file size at admission. Lower variants are
/// served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
    Lowest,
}

impl Priority {
    /// Thresholds per spec: HIGH < 5 MB, NORMAL 5-25 MB, LOW 25-50 MB, LOWEST >= 50 MB.
    pub fn from_file_size(bytes: u64) -> Self {
        const MB: u64 = 1024 * 1024;
        if bytes < 5 * MB {
            Priority::High
        } else if bytes < 25 * MB {
            Priority::Normal
        } else if bytes < 50 * MB {
            Priority::Low
        } else {
            Priority::Lowest
        }
    }

    /// Redis sorted-set key suffix for this tier.
    pub fn queue_suffix(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Lowest => "lowest",
        }
    }

    /// All tiers, highest-priority first.
    pub fn all() -> [Priority; 4] {
        [Priority::High, Priority::Normal, Priority::Low, Priority::Lowest]
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Outcome recorded on a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub output_path: String,
    pub winner_candidate: String,
    pub winner_reason: String,
    pub evaluation: EvaluationScore,
}

/// A unit of admitted work, owned exclusively by the queue until dequeue and
/// by a single worker thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub input_path: String,
    pub output_path: String,
    pub original_name: String,
    pub file_size: u64,
    pub priority: Priority,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub state: JobState,
    pub progress: u8,
    pub result: Option<JobResult>,
    pub failed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set by `mark_delayed`, cleared once the job is requeued. Durable so
    /// a retry survives a process restart instead of depending on an
    /// in-memory timer.
    #[serde(default)]
    pub retry_due_at: Option<DateTime<Utc>>,
}

impl Job {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub fn new(job_id: JobId, input_path: String, output_path: String, original_name: String, file_size: u64) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            input_path,
            output_path,
            original_name,
            file_size,
            priority: Priority::from_file_size(file_size),
            attempts_made: 0,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            state: JobState::Waiting,
            progress: 0,
            result: None,
            failed_reason: None,
            created_at: now,
            updated_at: now,
            retry_due_at: None,
        }
    }

    /// Record a monotonic progress update; no-op once terminal or if it
    /// would move progress backward.
    pub fn set_progress(&mut self, percent: u8) {
        if self.state.is_terminal() {
            return;
        }
        if percent > self.progress {
            self.progress = percent;
        }
        self.updated_at = Utc::now();
    }

    pub fn mark_active(&mut self) {
        self.state = JobState::Active;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, result: JobResult) {
        self.state = JobState::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, reason: String) {
        self.state = JobState::Failed;
        self.failed_reason = Some(reason);
        self.updated_at = Utc::now();
    }

    /// Mark the job delayed and compute its durable retry-due time from the
    /// post-increment backoff, so `retry_due_at` reflects this attempt.
    pub fn mark_delayed(&mut self, reason: String) {
        self.state = JobState::Delayed;
        self.failed_reason = Some(reason);
        self.attempts_made += 1;
        self.updated_at = Utc::now();
        self.retry_due_at = Some(self.updated_at + chrono::Duration::seconds(self.retry_backoff().as_secs() as i64));
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }

    /// Exponential backoff delay before the next retry attempt: base 1s, factor 2.
    pub fn retry_backoff(&self) -> std::time::Duration {
        let secs = 2u64.saturating_pow(self.attempts_made.min(16));
        std::time::Duration::from_secs(secs)
    }

    /// `retry_due_at` as a Unix epoch second count, for scoring the queue's
    /// delayed-job sorted set.
    pub fn retry_due_epoch_secs(&self) -> Option<f64> {
        self.retry_due_at.map(|t| t.timestamp() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_monotonicity() {
        let sizes = [0u64, 1024, 5 * 1024 * 1024, 25 * 1024 * 1024, 50 * 1024 * 1024, 200 * 1024 * 1024];
        let mut last = Priority::High;
        for (i, &s) in sizes.iter().enumerate() {
            let p = Priority::from_file_size(s);
            if i > 0 {
                assert!(p >= last, "priority must be monotonic in file size");
            }
            last = p;
        }
    }

    #[test]
    fn priority_boundaries() {
        assert_eq!(Priority::from_file_size(0), Priority::High);
        assert_eq!(Priority::from_file_size(5 * 1024 * 1024 - 1), Priority::High);
        assert_eq!(Priority::from_file_size(5 * 1024 * 1024), Priority::Normal);
        assert_eq!(Priority::from_file_size(25 * 1024 * 1024), Priority::Low);
        assert_eq!(Priority::from_file_size(50 * 1024 * 1024), Priority::Lowest);
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = Job::new(JobId::generate(), "in".into(), "out".into(), "name.wav".into(), 1024);
        job.mark_active();
        job.set_progress(50);
        job.set_progress(30);
        assert_eq!(job.progress, 50);
        job.set_progress(90);
        assert_eq!(job.progress, 90);
    }

    #[test]
    fn terminal_state_freezes_progress_and_ignores_updates() {
        let mut job = Job::new(JobId::generate(), "in".into(), "out".into(), "name.wav".into(), 1024);
        job.mark_active();
        job.set_progress(40);
        job.mark_failed("boom".into());
        job.set_progress(90);
        assert_eq!(job.progress, 40);
        assert!(job.state.is_terminal());
    }

    #[test]
    fn mark_delayed_sets_a_durable_retry_due_time() {
        let mut job = Job::new(JobId::generate(), "in".into(), "out".into(), "name.wav".into(), 1024);
        assert!(job.retry_due_at.is_none());
        job.mark_delayed("transient".into());
        let due = job.retry_due_at.expect("retry_due_at must be set once delayed");
        assert!(due > job.created_at);
    }

    #[test]
    fn retry_backoff_doubles() {
        let mut job = Job::new(JobId::generate(), "in".into(), "out".into(), "name.wav".into(), 1024);
        assert_eq!(job.retry_backoff(), std::time::Duration::from_secs(1));
        job.attempts_made = 1;
        assert_eq!(job.retry_backoff(), std::time::Duration::from_secs(2));
        job.attempts_made = 2;
        assert_eq!(job.retry_backoff(), std::time::Duration::from_secs(4));
    }
}
