//! Per-user, per-UTC-day submission quota.
//!
//! One permit is taken atomically just before a packet is handed off and given
//! back if the hand-off fails. Counters live in Redis and expire after two days.

use async_trait::async_trait;
use chrono::NaiveDate;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use uuid::Uuid;

use crate::errors::AppError;

const COUNTER_TTL_SECS: u64 = 48 * 60 * 60;

/// INCR, set the TTL on first use, and back the increment out when over the limit.
const ACQUIRE_SCRIPT: &str = r"
local n = redis.call('INCR', KEYS[1])
if n == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[2])
end
if n > tonumber(ARGV[1]) then
    redis.call('DECR', KEYS[1])
    return 0
end
return 1
";

/// DECR that never goes below zero.
const RELEASE_SCRIPT: &str = r"
local n = tonumber(redis.call('GET', KEYS[1]) or '0')
if n > 0 then
    return redis.call('DECR', KEYS[1])
end
return 0
";

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Takes one permit for `day`. False when the user already used `limit` permits.
    async fn try_acquire(&self, user_id: Uuid, day: NaiveDate, limit: u32)
        -> Result<bool, AppError>;
    async fn release(&self, user_id: Uuid, day: NaiveDate) -> Result<(), AppError>;
    async fn used(&self, user_id: Uuid, day: NaiveDate) -> Result<u32, AppError>;
}

pub fn counter_key(user_id: Uuid, day: NaiveDate) -> String {
    format!("jobflow:submissions:{user_id}:{}", day.format("%Y-%m-%d"))
}

pub struct RedisRateLimiter {
    conn: MultiplexedConnection,
    acquire: Script,
    release: Script,
}

impl RedisRateLimiter {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            acquire: Script::new(ACQUIRE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn try_acquire(
        &self,
        user_id: Uuid,
        day: NaiveDate,
        limit: u32,
    ) -> Result<bool, AppError> {
        if limit == 0 {
            return Ok(false);
        }
        let mut conn = self.conn.clone();
        let granted: i64 = self
            .acquire
            .key(counter_key(user_id, day))
            .arg(limit)
            .arg(COUNTER_TTL_SECS)
            .invoke_async(&mut conn)
            .await?;
        Ok(granted == 1)
    }

    async fn release(&self, user_id: Uuid, day: NaiveDate) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .release
            .key(counter_key(user_id, day))
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn used(&self, user_id: Uuid, day: NaiveDate) -> Result<u32, AppError> {
        let mut conn = self.conn.clone();
        let used: Option<u32> = conn.get(counter_key(user_id, day)).await?;
        Ok(used.unwrap_or(0))
    }
}
