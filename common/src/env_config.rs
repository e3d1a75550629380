use std::{env, str::FromStr, sync::Arc, time::Duration};

use crate::cycle::CycleLength;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Redis,
}

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// This struct holds all the necessary configuration parameters
/// required to initialize and run the gatekeeper: storage and
/// rate limit backends, JWT configuration for the management API,
/// server host and port, worker threads, CORS and logging settings,
/// and the tuning knobs of the request pipeline.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// Where users, keys, plans, subscriptions and usage events live.
    pub store_backend: StoreBackend,
    /// The URL of the database to connect to.
    pub database_url: String,
    /// Where per-key rate limit buckets live.
    pub rate_limit_backend: RateLimitBackend,
    /// The URL of Redis server to connect to.
    pub redis_url: String,
    /// Configuration for JWT (JSON Web Token) authentication.
    pub jwt_config: JwtConfig,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    pub log_level: log::LevelFilter,
    pub log_file: String,
    /// Server-wide ceiling applied before any per-key check.
    pub global_rate_limit_per_second: u32,
    /// Upper bound for a forwarded call.
    pub downstream_timeout: Duration,
    pub quota_cycle: CycleLength,
    /// Buffer size of the best-effort usage event channel.
    pub usage_channel_capacity: usize,
    pub argon2: Argon2Config,
}

#[derive(Clone, Debug)]
/// Configuration for JSON Web Token (JWT) authentication.
///
/// Holds the secret shared with the login service that mints the tokens.
pub struct JwtConfig {
    /// The secret key used to verify JWTs.
    pub secret: String,
}

#[derive(Clone, Debug)]
/// Cost parameters for hashing key secrets.
pub struct Argon2Config {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl JwtConfig {
    /// Reads `JWT_SECRET`.
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is not set.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        JwtConfig {
            secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
        }
    }
}

impl Argon2Config {
    fn from_env() -> Self {
        let params = argon2::Params::default();
        Argon2Config {
            memory_kib: env_or("ARGON2_MEMORY_KIB", params.m_cost()),
            iterations: env_or("ARGON2_ITERATIONS", params.t_cost()),
            parallelism: env_or("ARGON2_PARALLELISM", params.p_cost()),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `ENVIRONMENT`: `development` or `production`
    /// - `JWT_SECRET`: Secret key for JWT signing (via `JwtConfig::from_env()`)
    /// - `DATABASE_URL`: when `STORE_BACKEND` is `postgres` (the default)
    /// - `REDIS_URL`: when `RATE_LIMIT_BACKEND` is `redis`
    ///
    /// Optional (with defaults):
    /// - `IP`: Server host (default: "127.0.0.1")
    /// - `PORT`: Server port (default: 8080)
    /// - `WORKERS`: Number of worker threads (default: 4)
    /// - `CORS_ALLOWED_ORIGIN`: Allowed CORS origin (default: "http://localhost:3000")
    /// - `ENABLE_CONSOLE_LOGGING`: Whether to enable console logging (default: true)
    /// - `LOG_LEVEL` / `LOG_FILE`: (default: "info" / "gatekeeper.log")
    /// - `GLOBAL_RATE_LIMIT_PER_SECOND`: (default: 100)
    /// - `DOWNSTREAM_TIMEOUT_MS`: (default: 10000)
    /// - `QUOTA_CYCLE`: "monthly" or a number of seconds (default: "monthly")
    /// - `USAGE_CHANNEL_CAPACITY`: (default: 1024)
    /// - `ARGON2_MEMORY_KIB`, `ARGON2_ITERATIONS`, `ARGON2_PARALLELISM`
    ///
    /// # Panics
    ///
    /// This function will panic if required environment variables are missing or if
    /// values cannot be parsed correctly.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            "postgres" => StoreBackend::Postgres,
            other => panic!("STORE_BACKEND must be 'postgres' or 'memory', got '{}'", other),
        };
        let database_url = match store_backend {
            StoreBackend::Postgres => env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            StoreBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };

        let rate_limit_backend = match env::var("RATE_LIMIT_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => RateLimitBackend::Memory,
            "redis" => RateLimitBackend::Redis,
            other => panic!("RATE_LIMIT_BACKEND must be 'memory' or 'redis', got '{}'", other),
        };
        let redis_url = match rate_limit_backend {
            RateLimitBackend::Redis => env::var("REDIS_URL").expect("REDIS_URL must be set"),
            RateLimitBackend::Memory => env::var("REDIS_URL").unwrap_or_default(),
        };

        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|level| log::LevelFilter::from_str(&level).ok())
            .unwrap_or(log::LevelFilter::Info);

        let quota_cycle = env::var("QUOTA_CYCLE")
            .unwrap_or_else(|_| "monthly".to_string())
            .parse()
            .expect("QUOTA_CYCLE must be 'monthly' or a positive number of seconds");

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            store_backend,
            database_url,
            rate_limit_backend,
            redis_url,
            jwt_config: JwtConfig::from_env(),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env_or("PORT", 8080),
            num_workers: env_or("WORKERS", 4),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            log_level,
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "gatekeeper.log".to_string()),
            global_rate_limit_per_second: env_or("GLOBAL_RATE_LIMIT_PER_SECOND", 100),
            downstream_timeout: Duration::from_millis(env_or("DOWNSTREAM_TIMEOUT_MS", 10_000)),
            quota_cycle,
            usage_channel_capacity: env_or("USAGE_CHANNEL_CAPACITY", 1024),
            argon2: Argon2Config::from_env(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
