use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use dashmap::{DashMap, mapref::entry::Entry};
use uuid::Uuid;

use crate::{
    dtos::{
        key::{KeyCreateRequest, KeyRotateRequest},
        plan::{PlanCreateRequest, PlanUpdateRequest},
        usage::UsageFilter,
        user::UserCreateRequest,
    },
    models::{
        key::ApiKey, plan::Plan, subscription::Subscription, usage::UsageEvent, user::User,
    },
    store::{Store, SubscriptionUpdate},
};

/// Process-local store for development and tests. Nothing survives a restart.
///
/// Each map guard is dropped before another map is touched, so no two
/// shard locks are ever held at once.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    emails: DashMap<String, Uuid>,
    keys: DashMap<Uuid, ApiKey>,
    prefixes: DashMap<String, Uuid>,
    plans: DashMap<Uuid, Plan>,
    subscriptions: DashMap<Uuid, Subscription>,
    subscription_by_user: DashMap<Uuid, Uuid>,
    events: RwLock<Vec<UsageEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_prefix(&self, prefix: &str, key_id: Uuid) -> Res<()> {
        match self.prefixes.entry(prefix.to_string()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "Key prefix {} is already taken",
                prefix
            ))),
            Entry::Vacant(entry) => {
                entry.insert(key_id);
                Ok(())
            }
        }
    }
}

fn sorted_by_created<T>(
    values: impl Iterator<Item = T>,
    created_at: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let mut values: Vec<T> = values.collect();
    values.sort_by_key(|value| created_at(value));
    values
}

fn lock_poisoned() -> AppError {
    AppError::Internal("Usage event log lock poisoned".to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, data: UserCreateRequest) -> Res<User> {
        let user = User {
            id: Uuid::new_v4(),
            email: data.email,
            role: data.role,
            is_active: true,
            created_at: Utc::now(),
        };
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(format!(
                    "User with email {} already exists",
                    user.email
                )));
            }
            Entry::Vacant(entry) => {
                entry.insert(user.id);
            }
        }
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Res<Option<User>> {
        Ok(self.users.get(&user_id).map(|user| user.clone()))
    }

    async fn list_users(&self) -> Res<Vec<User>> {
        Ok(sorted_by_created(
            self.users.iter().map(|user| user.clone()),
            |user| user.created_at,
        ))
    }

    async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> Res<User> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        user.is_active = is_active;
        Ok(user.clone())
    }

    async fn insert_key(&self, data: KeyCreateRequest) -> Res<ApiKey> {
        if !self.users.contains_key(&data.user_id) {
            return Err(AppError::Conflict(format!(
                "User {} does not exist",
                data.user_id
            )));
        }

        let key = ApiKey {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            name: data.name,
            prefix: data.prefix,
            secret_hash: data.secret_hash,
            allowed_services: data.allowed_services,
            is_active: true,
            created_at: Utc::now(),
            expires_at: data.expires_at,
            rotated_at: None,
        };
        self.claim_prefix(&key.prefix, key.id)?;
        self.keys.insert(key.id, key.clone());
        Ok(key)
    }

    async fn get_key_by_id(&self, key_id: Uuid) -> Res<Option<ApiKey>> {
        Ok(self.keys.get(&key_id).map(|key| key.clone()))
    }

    async fn get_key_by_prefix(&self, prefix: &str) -> Res<Option<ApiKey>> {
        let Some(key_id) = self.prefixes.get(prefix).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self
            .keys
            .get(&key_id)
            .filter(|key| key.prefix == prefix)
            .map(|key| key.clone()))
    }

    async fn get_keys_by_user_id(&self, user_id: Uuid) -> Res<Vec<ApiKey>> {
        Ok(sorted_by_created(
            self.keys
                .iter()
                .filter(|key| key.user_id == user_id)
                .map(|key| key.clone()),
            |key| key.created_at,
        ))
    }

    async fn list_keys(&self) -> Res<Vec<ApiKey>> {
        Ok(sorted_by_created(
            self.keys.iter().map(|key| key.clone()),
            |key| key.created_at,
        ))
    }

    async fn rotate_key(&self, key_id: Uuid, data: KeyRotateRequest) -> Res<ApiKey> {
        match self.keys.get(&key_id).map(|key| key.is_active) {
            None => return Err(AppError::NotFound(format!("API key {}", key_id))),
            Some(false) => {
                return Err(AppError::Conflict(
                    "Revoked keys cannot be rotated".to_string(),
                ));
            }
            Some(true) => {}
        }

        self.claim_prefix(&data.prefix, key_id)?;

        let swapped = match self.keys.get_mut(&key_id) {
            Some(mut key) if key.is_active => {
                let old_prefix = std::mem::replace(&mut key.prefix, data.prefix.clone());
                key.secret_hash = data.secret_hash;
                key.rotated_at = Some(Utc::now());
                Ok((old_prefix, key.clone()))
            }
            _ => Err(AppError::Conflict(
                "Revoked keys cannot be rotated".to_string(),
            )),
        };

        match swapped {
            Ok((old_prefix, key)) => {
                self.prefixes.remove(&old_prefix);
                Ok(key)
            }
            Err(e) => {
                self.prefixes.remove(&data.prefix);
                Err(e)
            }
        }
    }

    async fn revoke_key(&self, key_id: Uuid) -> Res<ApiKey> {
        let mut key = self
            .keys
            .get_mut(&key_id)
            .ok_or_else(|| AppError::NotFound(format!("API key {}", key_id)))?;
        key.is_active = false;
        Ok(key.clone())
    }

    async fn revoke_keys_by_user_id(&self, user_id: Uuid) -> Res<u64> {
        let mut revoked = 0;
        for mut key in self.keys.iter_mut() {
            if key.user_id == user_id && key.is_active {
                key.is_active = false;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn insert_plan(&self, data: PlanCreateRequest) -> Res<Plan> {
        let now = Utc::now();
        let plan = Plan {
            id: Uuid::new_v4(),
            name: data.name,
            monthly_limit: data.monthly_limit,
            rate_limit_per_minute: data.rate_limit_per_minute,
            allowed_services: data.allowed_services,
            created_at: now,
            updated_at: now,
        };
        self.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn get_plan_by_id(&self, plan_id: Uuid) -> Res<Option<Plan>> {
        Ok(self.plans.get(&plan_id).map(|plan| plan.clone()))
    }

    async fn list_plans(&self) -> Res<Vec<Plan>> {
        Ok(sorted_by_created(
            self.plans.iter().map(|plan| plan.clone()),
            |plan| plan.created_at,
        ))
    }

    async fn update_plan(&self, plan_id: Uuid, data: PlanUpdateRequest) -> Res<Plan> {
        let mut plan = self
            .plans
            .get_mut(&plan_id)
            .ok_or_else(|| AppError::NotFound(format!("Plan {}", plan_id)))?;
        if let Some(name) = data.name {
            plan.name = name;
        }
        if let Some(monthly_limit) = data.monthly_limit {
            plan.monthly_limit = monthly_limit;
        }
        if let Some(rate_limit_per_minute) = data.rate_limit_per_minute {
            plan.rate_limit_per_minute = rate_limit_per_minute;
        }
        if let Some(allowed_services) = data.allowed_services {
            plan.allowed_services = allowed_services;
        }
        plan.updated_at = Utc::now();
        Ok(plan.clone())
    }

    async fn delete_plan(&self, plan_id: Uuid) -> Res<()> {
        if self
            .subscriptions
            .iter()
            .any(|subscription| subscription.plan_id == plan_id)
        {
            return Err(AppError::Conflict(format!(
                "Plan {} still has subscribers",
                plan_id
            )));
        }
        self.plans
            .remove(&plan_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Plan {}", plan_id)))
    }

    async fn upsert_subscription(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        reset_at: DateTime<Utc>,
    ) -> Res<Subscription> {
        if !self.users.contains_key(&user_id) || !self.plans.contains_key(&plan_id) {
            return Err(AppError::Conflict(format!(
                "User {} or plan {} does not exist",
                user_id, plan_id
            )));
        }

        let now = Utc::now();
        let subscription_id = *self
            .subscription_by_user
            .entry(user_id)
            .or_insert_with(Uuid::new_v4);

        let subscription = self
            .subscriptions
            .entry(subscription_id)
            .and_modify(|existing| {
                existing.plan_id = plan_id;
                existing.usage_count = 0;
                existing.reset_at = reset_at;
                existing.updated_at = now;
            })
            .or_insert_with(|| Subscription {
                id: subscription_id,
                user_id,
                plan_id,
                usage_count: 0,
                reset_at,
                created_at: now,
                updated_at: now,
            })
            .clone();
        Ok(subscription)
    }

    async fn get_subscription_by_user_id(&self, user_id: Uuid) -> Res<Option<Subscription>> {
        let Some(subscription_id) = self.subscription_by_user.get(&user_id).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self
            .subscriptions
            .get(&subscription_id)
            .map(|subscription| subscription.clone()))
    }

    async fn list_subscriptions(&self) -> Res<Vec<Subscription>> {
        Ok(sorted_by_created(
            self.subscriptions.iter().map(|s| s.clone()),
            |s| s.created_at,
        ))
    }

    async fn transact_subscription(
        &self,
        subscription_id: Uuid,
        apply: SubscriptionUpdate<'_>,
    ) -> Res<(Subscription, bool)> {
        // The shard write lock is held for the whole read-modify-write.
        let mut subscription = self
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| AppError::NotFound(format!("Subscription {}", subscription_id)))?;
        let admitted = apply(&mut *subscription);
        subscription.updated_at = Utc::now();
        Ok((subscription.clone(), admitted))
    }

    async fn insert_usage_events(&self, events: &[UsageEvent]) -> Res<()> {
        self.events
            .write()
            .map_err(|_| lock_poisoned())?
            .extend_from_slice(events);
        Ok(())
    }

    async fn get_usage_events(&self, filter: UsageFilter) -> Res<Vec<UsageEvent>> {
        let mut events: Vec<UsageEvent> = self
            .events
            .read()
            .map_err(|_| lock_poisoned())?
            .iter()
            .filter(|event| event.timestamp >= filter.since)
            .filter(|event| filter.user_id.is_none_or(|id| event.user_id == Some(id)))
            .filter(|event| filter.key_id.is_none_or(|id| event.key_id == Some(id)))
            .cloned()
            .collect();
        events.sort_by_key(|event| event.timestamp);
        Ok(events)
    }
}
