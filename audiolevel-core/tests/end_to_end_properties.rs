//! Integration tests exercising cross-module properties: priority ordering,
//! admission gating, queue health derivation, and retry backoff, all against
//! an in-memory `KvStore` so no real Redis is required.

use async_trait::async_trait;
use audiolevel_core::admission::AdmissionController;
use audiolevel_core::kvstore::{KvStore, RateLimitOutcome, StoreError};
use audiolevel_core::models::{Job, Priority};
use audiolevel_core::queue::JobQueue;
use audiolevel_common::JobId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;

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
        let idx = set
            .iter()
            .enumerate()
            .min_by(|(_, (_, a)), (_, (_, b))| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
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

fn job(input_name: &str, size: u64) -> Job {
    Job::new(JobId::generate(), format!("/tmp/{input_name}-input.wav"), format!("/tmp/{input_name}-output.wav"), input_name.to_string(), size)
}

#[tokio::test]
async fn higher_priority_always_dequeues_before_lower() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::default());
    let queue = JobQueue::new(store, 4);

    const MB: u64 = 1024 * 1024;
    queue.enqueue(job("lowest", 60 * MB)).await.unwrap();
    queue.enqueue(job("low", 30 * MB)).await.unwrap();
    queue.enqueue(job("normal", 10 * MB)).await.unwrap();
    queue.enqueue(job("high", 1 * MB)).await.unwrap();

    let first = queue.dequeue().await.unwrap().unwrap();
    let second = queue.dequeue().await.unwrap().unwrap();
    let third = queue.dequeue().await.unwrap().unwrap();
    let fourth = queue.dequeue().await.unwrap().unwrap();

    assert_eq!(first.priority, Priority::High);
    assert_eq!(second.priority, Priority::Normal);
    assert_eq!(third.priority, Priority::Low);
    assert_eq!(fourth.priority, Priority::Lowest);
    assert!(queue.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn fifo_within_a_single_priority_tier() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::default());
    let queue = JobQueue::new(store, 4);

    let first_id = {
        let j = job("first", 1024);
        let id = j.job_id.clone();
        queue.enqueue(j).await.unwrap();
        id
    };
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second_id = {
        let j = job("second", 1024);
        let id = j.job_id.clone();
        queue.enqueue(j).await.unwrap();
        id
    };

    let first = queue.dequeue().await.unwrap().unwrap();
    let second = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(first.job_id, first_id);
    assert_eq!(second.job_id, second_id);
}

#[tokio::test]
async fn queue_health_status_crosses_thresholds_as_depth_grows() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::default());
    let queue = JobQueue::new(store, 4);

    for i in 0..9 {
        queue.enqueue(job(&format!("job{i}"), 1024)).await.unwrap();
    }
    let health = queue.health(0, 0, 0, 0).await.unwrap();
    assert_eq!(health.status, audiolevel_core::queue::QueueHealthStatus::Normal);

    for i in 9..15 {
        queue.enqueue(job(&format!("job{i}"), 1024)).await.unwrap();
    }
    let health = queue.health(0, 0, 0, 0).await.unwrap();
    assert_eq!(health.status, audiolevel_core::queue::QueueHealthStatus::Warning);
}

#[tokio::test]
async fn admission_gate_rejects_low_priority_once_warning_threshold_crossed() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::default());
    let queue = Arc::new(JobQueue::new(store, 4));

    for i in 0..11 {
        queue.enqueue(job(&format!("job{i}"), 60 * 1024 * 1024)).await.unwrap();
    }

    assert!(queue.admits(Priority::High).await.unwrap());
    assert!(queue.admits(Priority::Normal).await.unwrap());
    assert!(!queue.admits(Priority::Low).await.unwrap());
    assert!(!queue.admits(Priority::Lowest).await.unwrap());
}

#[tokio::test]
async fn admission_controller_rejects_oversize_before_touching_the_queue() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::default());
    let queue = Arc::new(JobQueue::new(store.clone(), 4));
    let controller = AdmissionController::new(queue, store, 10 * 1024 * 1024);

    assert!(controller.check_size(20 * 1024 * 1024).is_err());
    assert!(controller.check_size(1024).is_ok());
}

#[test]
fn retry_backoff_grows_exponentially_and_saturates() {
    let mut j = job("retry-probe", 1024);
    assert_eq!(j.retry_backoff(), std::time::Duration::from_secs(1));
    j.mark_delayed("transient failure".to_string());
    assert_eq!(j.retry_backoff(), std::time::Duration::from_secs(2));
    j.mark_delayed("transient failure".to_string());
    assert_eq!(j.retry_backoff(), std::time::Duration::from_secs(4));
}

#[test]
fn progress_never_moves_backward_once_set() {
    let mut j = job("progress-probe", 1024);
    j.set_progress(30);
    j.set_progress(10);
    assert_eq!(j.progress, 30);
    j.set_progress(85);
    assert_eq!(j.progress, 85);
}

#[test]
fn terminal_state_freezes_progress() {
    let mut j = job("terminal-probe", 1024);
    j.mark_failed("boom".to_string());
    j.set_progress(99);
    assert_eq!(j.progress, 0);
}
