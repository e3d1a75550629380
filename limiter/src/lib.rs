use middleware::global::GlobalLimiter;

pub mod quota;
pub mod rate;

pub mod middleware {
    pub mod global;
}

pub use quota::{QuotaDecision, QuotaLedger};
pub use rate::{MemoryRateLimiter, RateDecision, RateLimiter, RedisRateLimiter};

pub fn global_middleware(permits_per_second: u32) -> GlobalLimiter {
    GlobalLimiter::new(permits_per_second)
}
