mod cors;
mod redis;

use std::{sync::Arc, time::Duration};

use actix_web::{
    App, HttpServer,
    web::{self},
};
use api_keys::CredentialVerifier;
use api_subs::AuthorizationResolver;
use chrono::Utc;
use common::{
    env_config::{Config, RateLimitBackend, StoreBackend},
    key::SecretHasher,
};
use db::{MemoryStore, PgStore, Store};
use gatekeeper::Gatekeeper;
use limiter::{MemoryRateLimiter, QuotaLedger, RateLimiter, RedisRateLimiter};
use logger::UsageRecorder;

/// How often idle in-process rate buckets are dropped.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();
    let origin = config.cors_allowed_origin.clone();

    // init logger
    logger::setup(&config).expect("Failed to set up logger");

    // init storage
    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = db::setup(&config.database_url, config.is_production())
                .await
                .expect("Failed to set up database");
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            log::warn!("Using the in-memory store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // init rate limit buckets
    let rate_limiter: Arc<dyn RateLimiter> = match config.rate_limit_backend {
        RateLimitBackend::Redis => Arc::new(RedisRateLimiter::new(redis::setup_redis(&config))),
        RateLimitBackend::Memory => {
            let limiter = Arc::new(MemoryRateLimiter::new());
            let pruned = limiter.clone();
            actix_web::rt::spawn(async move {
                let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
                loop {
                    ticker.tick().await;
                    pruned.prune(Utc::now());
                    log::debug!("Tracking rate buckets for {} key(s)", pruned.tracked_keys());
                }
            });
            limiter
        }
    };

    let hasher = SecretHasher::new(
        config.argon2.memory_kib,
        config.argon2.iterations,
        config.argon2.parallelism,
    )
    .expect("Invalid Argon2 parameters");

    // usage events of rejected calls are written in the background
    let (recorder, worker) = UsageRecorder::new(store.clone(), config.usage_channel_capacity);
    let writer = actix_web::rt::spawn(worker.run());

    let gate = Arc::new(Gatekeeper::new(
        CredentialVerifier::new(store.clone(), hasher.clone()).expect("Failed to prepare verifier"),
        AuthorizationResolver::new(store.clone()),
        rate_limiter,
        QuotaLedger::new(store.clone(), config.quota_cycle),
        recorder,
        config.downstream_timeout,
    ));

    let global_limiter = limiter::global_middleware(config.global_rate_limit_per_second);

    log::info!(
        "Listening on {}:{} ({} environment)",
        config.server_host,
        config.server_port,
        config.environment
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(hasher.clone()))
            .app_data(web::Data::new(config_data.quota_cycle))
            .wrap(global_limiter.clone()) // 4th
            .wrap(logger::middleware(config_data.console_logging_enabled)) // 3rd
            .wrap(extractor::middleware(&config_data.jwt_config.secret)) // 2nd
            .wrap(cors::middleware(&origin)) // 1st
            .service(
                web::scope("/api")
                    .service(services::mount_catalogue())
                    .service(services::mount_v1().wrap(gatekeeper::middleware(gate.clone())))
                    .service(
                        web::scope("/dashboard")
                            .wrap(api_auth::auth_middleware(store.clone()))
                            .service(api_auth::mount_me())
                            .service(api_keys::mount_keys())
                            .service(api_keys::mount_usage())
                            .service(api_subs::mount_subscription()),
                    )
                    .service(
                        web::scope("/admin")
                            .wrap(api_auth::admin_middleware(store.clone()))
                            .service(api_subs::mount_admin_plans())
                            .service(api_subs::mount_admin_subscriptions())
                            .service(api_subs::mount_admin_users())
                            .service(api_keys::mount_admin_keys())
                            .service(api_keys::mount_admin_usage()),
                    ),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await?;

    // the server is down; give the writer a moment to flush what is buffered
    if tokio::time::timeout(Duration::from_secs(5), writer).await.is_err() {
        log::warn!("Usage writer did not finish in time, buffered events are lost");
    }
    Ok(())
}
