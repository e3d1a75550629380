use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::Res;
use uuid::Uuid;

use super::{RateDecision, RateLimiter, WINDOW_SECS};

/// Buckets kept in Redis so every gatekeeper instance sees the same counts.
///
/// The bucket starts with the first request (`SET NX EX`) and ends when the
/// key expires. Redis owns the clock here; `now` is not consulted.
#[derive(Clone)]
pub struct RedisRateLimiter {
    pool: deadpool_redis::Pool,
}

impl RedisRateLimiter {
    pub fn new(pool: deadpool_redis::Pool) -> Self {
        Self { pool }
    }
}

fn bucket_key(key_id: Uuid) -> String {
    format!("rate:{}", key_id)
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key_id: Uuid, limit: u32, _now: DateTime<Utc>) -> Res<RateDecision> {
        let mut conn = self.pool.get().await?;
        let key = bucket_key(key_id);

        let (count, ttl): (u64, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(0)
            .arg("NX")
            .arg("EX")
            .arg(WINDOW_SECS)
            .ignore()
            .cmd("INCR")
            .arg(&key)
            .cmd("TTL")
            .arg(&key)
            .query_async(&mut conn)
            .await?;

        Ok(decide(count, ttl, limit))
    }
}

/// Turns the bucket's `INCR` result and `TTL` into a decision. A missing or
/// persistent TTL (`-2`/`-1`) falls back to a full window.
fn decide(count: u64, ttl: i64, limit: u32) -> RateDecision {
    let retry_after_secs = if ttl > 0 { ttl as u64 } else { WINDOW_SECS as u64 };
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    RateDecision::from_count(count, limit, retry_after_secs)
}
