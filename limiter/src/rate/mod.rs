use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::Res;
use uuid::Uuid;

mod memory;
mod redis;

pub use self::memory::MemoryRateLimiter;
pub use self::redis::RedisRateLimiter;

/// Length of one rate limit bucket.
pub const WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    pub(crate) fn from_count(count: u32, limit: u32, retry_after_secs: u64) -> Self {
        if count > limit {
            RateDecision::Limited {
                retry_after_secs: retry_after_secs.max(1),
            }
        } else {
            RateDecision::Allowed {
                remaining: limit - count,
            }
        }
    }
}

/// Per-key fixed-window counter.
///
/// A check counts the request and decides in one atomic step: of `limit + 1`
/// simultaneous requests on one key, exactly one is refused.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key_id: Uuid, limit: u32, now: DateTime<Utc>) -> Res<RateDecision>;
}

