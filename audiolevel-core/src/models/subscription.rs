//! Progress Bus subscription bookkeeping.

use audiolevel_common::JobId;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

pub const MAX_SUBSCRIPTIONS_PER_SESSION: usize = 100;

/// A live real-time client session and the jobs it has subscribed to.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub session_id: String,
    pub subscribed_jobs: HashSet<JobId>,
    pub last_ping_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            subscribed_jobs: HashSet::new(),
            last_ping_at: Utc::now(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.subscribed_jobs.len() >= MAX_SUBSCRIPTIONS_PER_SESSION
    }

    pub fn touch(&mut self) {
        self.last_ping_at = Utc::now();
    }

    pub fn idle_for(&self) -> chrono::Duration {
        Utc::now() - self.last_ping_at
    }
}
