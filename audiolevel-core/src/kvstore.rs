//! KvStore
//!
//! Thin trait over the external key/value store used as queue backing,
//! rate-limit bucket storage, and lease/counter state. The production
//! implementation wraps `redis::aio::ConnectionManager`; its own semantics
//! (durability, replication) are assumed, per spec.md §1 — this crate only
//! depends on the operations named below and their atomicity guarantees.

use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

/// Result of an atomic sliding-window rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitOutcome {
    pub admitted: bool,
    pub remaining: u64,
    pub retry_after_secs: u64,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Score-ordered insert used for the priority queue tiers.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;
    /// Pop the lowest-scored member (FIFO within a tier, by enqueue time).
    async fn zpopmin(&self, key: &str) -> Result<Option<(String, f64)>, StoreError>;
    async fn zcard(&self, key: &str) -> Result<u64, StoreError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Atomic sliding-window rate-limit check: remove entries older than
    /// `window_ms`, count survivors, and (if under `max_requests`) insert a
    /// new entry — all as a single server-side script, per spec.md's
    /// explicit atomicity requirement.
    async fn rate_limit_check(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        max_requests: u64,
        nonce: &str,
    ) -> Result<RateLimitOutcome, StoreError>;
}

/// Lua script implementing the atomic rate-limit check: zremrangebyscore +
/// zcard + (conditionally) zadd + expire, in one round trip.
const RATE_LIMIT_SCRIPT: &str = r#"
local key = KEYS[1]
local now_ms = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local max_requests = tonumber(ARGV[3])
local nonce = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now_ms - window_ms)
local count = redis.call('ZCARD', key)

if count < max_requests then
    redis.call('ZADD', key, now_ms, now_ms .. ':' .. nonce)
    redis.call('PEXPIRE', key, window_ms)
    return {1, max_requests - count - 1, 0}
else
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    local retry_after = 0
    if #oldest == 2 then
        local oldest_score = tonumber(oldest[2])
        retry_after = math.ceil((oldest_score + window_ms - now_ms) / 1000)
    end
    return {0, 0, retry_after}
end
"#;

pub struct RedisStore {
    conn: Arc<tokio::sync::Mutex<redis::aio::ConnectionManager>>,
    rate_limit_script: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn: Arc::new(tokio::sync::Mutex::new(conn)),
            rate_limit_script: Script::new(RATE_LIMIT_SCRIPT),
        })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.lock().await;
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock().await;
        Ok(conn.exists(key).await?)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zpopmin(&self, key: &str) -> Result<Option<(String, f64)>, StoreError> {
        let mut conn = self.conn.lock().await;
        let result: Vec<(String, f64)> = conn.zpopmin(key, 1).await?;
        Ok(result.into_iter().next())
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.lock().await;
        Ok(conn.zcard(key).await?)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let _: () = conn.zrem(key, member).await?;
        Ok(())
    }

    async fn rate_limit_check(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        max_requests: u64,
        nonce: &str,
    ) -> Result<RateLimitOutcome, StoreError> {
        let mut conn = self.conn.lock().await;
        let (admitted, remaining, retry_after_secs): (i64, i64, i64) = self
            .rate_limit_script
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(max_requests)
            .arg(nonce)
            .invoke_async(&mut *conn)
            .await?;

        Ok(RateLimitOutcome {
            admitted: admitted == 1,
            remaining: remaining.max(0) as u64,
            retry_after_secs: retry_after_secs.max(0) as u64,
        })
    }
}
