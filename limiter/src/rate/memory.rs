use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::error::Res;
use dashmap::DashMap;
use uuid::Uuid;

use super::{RateDecision, RateLimiter, WINDOW_SECS};

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started_at: DateTime<Utc>,
}

/// Buckets held in process memory. Not shared between instances.
pub struct MemoryRateLimiter {
    windows: DashMap<Uuid, Window>,
    length: Duration,
}

impl Default for MemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            length: Duration::seconds(WINDOW_SECS),
        }
    }

    /// Drops buckets that ended before `now`.
    pub fn prune(&self, now: DateTime<Utc>) {
        let length = self.length;
        self.windows
            .retain(|_, window| now - window.started_at < length);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, key_id: Uuid, limit: u32, now: DateTime<Utc>) -> Res<RateDecision> {
        // The entry guard holds the shard lock until the decision is made.
        let mut window = self.windows.entry(key_id).or_insert(Window {
            count: 0,
            started_at: now,
        });

        if now - window.started_at >= self.length {
            *window = Window {
                count: 0,
                started_at: now,
            };
        }
        window.count = window.count.saturating_add(1);

        let left = (window.started_at + self.length - now).num_milliseconds();
        let retry_after_secs = ((left + 999) / 1000).max(1) as u64;

        Ok(RateDecision::from_count(window.count, limit, retry_after_secs))
    }
}
