use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    dtos::{
        key::{KeyCreateRequest, KeyRotateRequest},
        plan::{PlanCreateRequest, PlanUpdateRequest},
        usage::UsageFilter,
        user::UserCreateRequest,
    },
    key, plan,
    models::{
        key::ApiKey, plan::Plan, subscription::Subscription, usage::UsageEvent, user::User,
    },
    store::{Store, SubscriptionUpdate},
    subscription, usage, user,
};

/// Durable store backed by Postgres.
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        PgStore { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, data: UserCreateRequest) -> Res<User> {
        user::insert_user(&*self.pool, data).await
    }
    async fn get_user_by_id(&self, user_id: Uuid) -> Res<Option<User>> {
        user::get_user_by_id(&*self.pool, user_id).await
    }
    async fn list_users(&self) -> Res<Vec<User>> {
        user::get_users(&*self.pool).await
    }
    async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> Res<User> {
        user::update_user_active(&*self.pool, user_id, is_active).await
    }

    async fn insert_key(&self, data: KeyCreateRequest) -> Res<ApiKey> {
        key::insert_key(&*self.pool, data).await
    }
    async fn get_key_by_id(&self, key_id: Uuid) -> Res<Option<ApiKey>> {
        key::get_key_by_id(&*self.pool, key_id).await
    }
    async fn get_key_by_prefix(&self, prefix: &str) -> Res<Option<ApiKey>> {
        key::get_key_by_prefix(&*self.pool, prefix).await
    }
    async fn get_keys_by_user_id(&self, user_id: Uuid) -> Res<Vec<ApiKey>> {
        key::get_keys_by_user_id(&*self.pool, user_id).await
    }
    async fn list_keys(&self) -> Res<Vec<ApiKey>> {
        key::get_keys(&*self.pool).await
    }
    async fn rotate_key(&self, key_id: Uuid, data: KeyRotateRequest) -> Res<ApiKey> {
        if let Some(rotated) = key::update_key_secret(&*self.pool, key_id, data).await? {
            return Ok(rotated);
        }
        match key::get_key_by_id(&*self.pool, key_id).await? {
            Some(_) => Err(AppError::Conflict(
                "Revoked keys cannot be rotated".to_string(),
            )),
            None => Err(AppError::NotFound(format!("API key {}", key_id))),
        }
    }
    async fn revoke_key(&self, key_id: Uuid) -> Res<ApiKey> {
        key::deactivate_key(&*self.pool, key_id).await
    }
    async fn revoke_keys_by_user_id(&self, user_id: Uuid) -> Res<u64> {
        key::deactivate_keys_by_user_id(&*self.pool, user_id).await
    }

    async fn insert_plan(&self, data: PlanCreateRequest) -> Res<Plan> {
        plan::insert_plan(&*self.pool, data).await
    }
    async fn get_plan_by_id(&self, plan_id: Uuid) -> Res<Option<Plan>> {
        plan::get_plan_by_id(&*self.pool, plan_id).await
    }
    async fn list_plans(&self) -> Res<Vec<Plan>> {
        plan::get_plans(&*self.pool).await
    }
    async fn update_plan(&self, plan_id: Uuid, data: PlanUpdateRequest) -> Res<Plan> {
        plan::update_plan(&*self.pool, plan_id, data).await
    }
    async fn delete_plan(&self, plan_id: Uuid) -> Res<()> {
        plan::delete_plan(&*self.pool, plan_id).await
    }

    async fn upsert_subscription(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        reset_at: DateTime<Utc>,
    ) -> Res<Subscription> {
        subscription::upsert_subscription(&*self.pool, user_id, plan_id, reset_at).await
    }
    async fn get_subscription_by_user_id(&self, user_id: Uuid) -> Res<Option<Subscription>> {
        subscription::get_subscription_by_user_id(&*self.pool, user_id).await
    }
    async fn list_subscriptions(&self) -> Res<Vec<Subscription>> {
        subscription::get_subscriptions(&*self.pool).await
    }
    async fn transact_subscription(
        &self,
        subscription_id: Uuid,
        apply: SubscriptionUpdate<'_>,
    ) -> Res<(Subscription, bool)> {
        subscription::transact_subscription(&self.pool, subscription_id, |s| apply(s)).await
    }

    async fn insert_usage_events(&self, events: &[UsageEvent]) -> Res<()> {
        usage::insert_usage_events(&*self.pool, events).await
    }
    async fn get_usage_events(&self, filter: UsageFilter) -> Res<Vec<UsageEvent>> {
        usage::get_usage_events(&*self.pool, filter).await
    }
}
