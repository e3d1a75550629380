#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use api_keys::{CredentialVerifier, IssuedKey, service::key::issue_key};
use api_subs::AuthorizationResolver;
use chrono::Utc;
use common::{cycle::CycleLength, key::SecretHasher};
use db::{
    MemoryStore, Store,
    dtos::{plan::PlanCreateRequest, usage::UsageFilter, user::UserCreateRequest},
    models::{usage::UsageEvent, user::Role},
};
use gatekeeper::Gatekeeper;
use limiter::{MemoryRateLimiter, QuotaLedger, RateLimiter};
use logger::UsageRecorder;
use uuid::Uuid;

pub struct Options {
    pub monthly_limit: i64,
    pub rate_limit_per_minute: i32,
    pub plan_services: Vec<String>,
    pub downstream_timeout: Duration,
    pub rate_limiter: Option<Arc<dyn RateLimiter>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            monthly_limit: 1000,
            rate_limit_per_minute: 1000,
            plan_services: vec![],
            downstream_timeout: Duration::from_secs(5),
            rate_limiter: None,
        }
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gatekeeper: Arc<Gatekeeper>,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    hasher: SecretHasher,
}

pub async fn harness(monthly_limit: i64, rate_limit_per_minute: i32) -> Harness {
    harness_with(Options {
        monthly_limit,
        rate_limit_per_minute,
        ..Default::default()
    })
    .await
}

pub async fn harness_with(options: Options) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let hasher = SecretHasher::new(8, 1, 1).unwrap();

    let user = store
        .insert_user(UserCreateRequest {
            email: "gate@example.com".to_string(),
            role: Role::Client,
        })
        .await
        .unwrap();
    let plan = store
        .insert_plan(PlanCreateRequest {
            name: "test".to_string(),
            monthly_limit: options.monthly_limit,
            rate_limit_per_minute: options.rate_limit_per_minute,
            allowed_services: options.plan_services,
        })
        .await
        .unwrap();
    store
        .upsert_subscription(user.id, plan.id, Utc::now() + chrono::Duration::days(30))
        .await
        .unwrap();

    let shared: Arc<dyn Store> = store.clone();
    let (recorder, worker) = UsageRecorder::new(shared.clone(), 1024);
    tokio::spawn(worker.run());

    let rate_limiter = options
        .rate_limiter
        .unwrap_or_else(|| Arc::new(MemoryRateLimiter::new()) as Arc<dyn RateLimiter>);
    let gatekeeper = Gatekeeper::new(
        CredentialVerifier::new(shared.clone(), hasher.clone()).unwrap(),
        AuthorizationResolver::new(shared.clone()),
        rate_limiter,
        QuotaLedger::new(shared, CycleLength::CalendarMonth),
        recorder,
        options.downstream_timeout,
    );

    Harness {
        store,
        gatekeeper: Arc::new(gatekeeper),
        user_id: user.id,
        plan_id: plan.id,
        hasher,
    }
}

impl Harness {
    pub async fn issue(&self, services: &[&str]) -> IssuedKey {
        issue_key(
            &*self.store,
            &self.hasher,
            self.user_id,
            "test key".to_string(),
            services.iter().map(|service| service.to_string()).collect(),
            None,
        )
        .await
        .unwrap()
    }

    pub async fn usage_count(&self) -> i64 {
        self.store
            .get_subscription_by_user_id(self.user_id)
            .await
            .unwrap()
            .unwrap()
            .usage_count
    }

    pub async fn events(&self) -> Vec<UsageEvent> {
        self.store
            .get_usage_events(UsageFilter {
                user_id: None,
                key_id: None,
                since: Utc::now() - chrono::Duration::days(1),
            })
            .await
            .unwrap()
    }

    /// Waits for the background writer to catch up.
    pub async fn wait_for_events(&self, count: usize) -> Vec<UsageEvent> {
        for _ in 0..200 {
            let events = self.events().await;
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events().await
    }
}
