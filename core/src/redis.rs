use common::env_config::Config;

/// Connection pool for the shared rate limit buckets.
pub fn setup_redis(config: &Config) -> deadpool_redis::Pool {
    let cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let pool = cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("Failed to create pool of Redis connections");
    log::info!("Rate limit buckets live in Redis");
    pool
}
