//! Progress Bus
//!
//! Fans out per-job progress events to zero or more subscribed real-time
//! sessions. Holds `sessionId -> session` and `jobId -> set<sessionId>`
//! under one mutex so a session close can walk its own subscriptions and
//! remove every backref without a second lock acquisition racing a publish.

use crate::models::Subscription;
use audiolevel_common::JobId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

pub const HEARTBEAT_IDLE_SECS: i64 = 60;

/// Client -> server frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { job_id: String },
    Unsubscribe { job_id: String },
    Ping,
}

/// Server -> client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Subscribed { job_id: String },
    Unsubscribed { job_id: String },
    Progress { job_id: String, percent: u8, stage: Option<String> },
    Complete { job_id: String, download_url: String, metrics: Option<serde_json::Value> },
    Error { message: String, code: Option<String> },
    Pong { timestamp: i64 },
}

struct SessionEntry {
    subscription: Subscription,
    sender: mpsc::UnboundedSender<ServerFrame>,
}

#[derive(Default)]
struct Tables {
    sessions: HashMap<String, SessionEntry>,
    job_subscribers: HashMap<JobId, HashSet<String>>,
}

/// Process-wide subscription registry, initialized once at startup.
#[derive(Clone)]
pub struct ProgressBus {
    tables: Arc<Mutex<Tables>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self { tables: Arc::new(Mutex::new(Tables::default())) }
    }

    pub async fn register_session(&self, session_id: String) -> mpsc::UnboundedReceiver<ServerFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut tables = self.tables.lock().await;
        tables.sessions.insert(session_id.clone(), SessionEntry { subscription: Subscription::new(session_id), sender: tx });
        rx
    }

    /// Remove a session and every backref to it; never walks the reverse
    /// direction under load.
    pub async fn close_session(&self, session_id: &str) {
        let mut tables = self.tables.lock().await;
        if let Some(entry) = tables.sessions.remove(session_id) {
            for job_id in entry.subscription.subscribed_jobs {
                if let Some(subs) = tables.job_subscribers.get_mut(&job_id) {
                    subs.remove(session_id);
                    if subs.is_empty() {
                        tables.job_subscribers.remove(&job_id);
                    }
                }
            }
        }
    }

    pub async fn touch(&self, session_id: &str) {
        let mut tables = self.tables.lock().await;
        if let Some(entry) = tables.sessions.get_mut(session_id) {
            entry.subscription.touch();
        }
    }

    /// A subscribe for an unknown JobId is not an error; it simply waits.
    pub async fn subscribe(&self, session_id: &str, job_id: JobId) -> Result<(), &'static str> {
        let mut tables = self.tables.lock().await;
        let Some(entry) = tables.sessions.get_mut(session_id) else { return Ok(()) };
        if entry.subscription.is_full() {
            return Err("SUBSCRIPTION_LIMIT");
        }
        entry.subscription.subscribed_jobs.insert(job_id.clone());
        tables.job_subscribers.entry(job_id).or_default().insert(session_id.to_string());
        Ok(())
    }

    pub async fn unsubscribe(&self, session_id: &str, job_id: &JobId) {
        let mut tables = self.tables.lock().await;
        if let Some(entry) = tables.sessions.get_mut(session_id) {
            entry.subscription.subscribed_jobs.remove(job_id);
        }
        if let Some(subs) = tables.job_subscribers.get_mut(job_id) {
            subs.remove(session_id);
        }
    }

    /// Best-effort fan-out: a dead subscriber's closed channel is dropped
    /// silently and never blocks delivery to the others.
    pub async fn publish(&self, job_id: &JobId, frame: ServerFrame) {
        let tables = self.tables.lock().await;
        let Some(subs) = tables.job_subscribers.get(job_id) else { return };
        for session_id in subs {
            if let Some(entry) = tables.sessions.get(session_id) {
                let _ = entry.sender.send(frame.clone());
            }
        }
    }

    pub async fn send_to(&self, session_id: &str, frame: ServerFrame) {
        let tables = self.tables.lock().await;
        if let Some(entry) = tables.sessions.get(session_id) {
            let _ = entry.sender.send(frame);
        }
    }

    /// Sweep every session idle longer than `HEARTBEAT_IDLE_SECS`, returning
    /// the closed session ids so the caller can drop their socket tasks.
    pub async fn sweep_idle(&self) -> Vec<String> {
        let idle: Vec<String> = {
            let tables = self.tables.lock().await;
            tables
                .sessions
                .iter()
                .filter(|(_, entry)| (Utc::now() - entry.subscription.last_ping_at).num_seconds() > HEARTBEAT_IDLE_SECS)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for session_id in &idle {
            self.close_session(session_id).await;
        }
        idle
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}
