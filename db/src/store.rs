use async_trait::async_trait;
use common::error::Res;
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
};

/// Mutation applied to a subscription while it is locked. Returns whether the
/// caller's request was admitted.
pub type SubscriptionUpdate<'a> = &'a (dyn Fn(&mut Subscription) -> bool + Send + Sync);

/// Persistent state of the gatekeeper.
///
/// Lookups return `Ok(None)` for missing rows; mutations of missing rows
/// return `AppError::NotFound`. Uniqueness and reference violations return
/// `AppError::Conflict`.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Users --
    async fn insert_user(&self, data: UserCreateRequest) -> Res<User>;
    async fn get_user_by_id(&self, user_id: Uuid) -> Res<Option<User>>;
    async fn list_users(&self) -> Res<Vec<User>>;
    async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> Res<User>;

    // -- API keys --
    async fn insert_key(&self, data: KeyCreateRequest) -> Res<ApiKey>;
    async fn get_key_by_id(&self, key_id: Uuid) -> Res<Option<ApiKey>>;
    async fn get_key_by_prefix(&self, prefix: &str) -> Res<Option<ApiKey>>;
    async fn get_keys_by_user_id(&self, user_id: Uuid) -> Res<Vec<ApiKey>>;
    async fn list_keys(&self) -> Res<Vec<ApiKey>>;
    /// Replaces prefix and secret hash of an active key.
    async fn rotate_key(&self, key_id: Uuid, data: KeyRotateRequest) -> Res<ApiKey>;
    async fn revoke_key(&self, key_id: Uuid) -> Res<ApiKey>;
    /// Returns how many keys were still active.
    async fn revoke_keys_by_user_id(&self, user_id: Uuid) -> Res<u64>;

    // -- Plans --
    async fn insert_plan(&self, data: PlanCreateRequest) -> Res<Plan>;
    async fn get_plan_by_id(&self, plan_id: Uuid) -> Res<Option<Plan>>;
    async fn list_plans(&self) -> Res<Vec<Plan>>;
    async fn update_plan(&self, plan_id: Uuid, data: PlanUpdateRequest) -> Res<Plan>;
    async fn delete_plan(&self, plan_id: Uuid) -> Res<()>;

    // -- Subscriptions --
    async fn upsert_subscription(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        reset_at: chrono::DateTime<chrono::Utc>,
    ) -> Res<Subscription>;
    async fn get_subscription_by_user_id(&self, user_id: Uuid) -> Res<Option<Subscription>>;
    async fn list_subscriptions(&self) -> Res<Vec<Subscription>>;
    /// Read-modify-write of one subscription, atomic with respect to every
    /// other call on the same row.
    async fn transact_subscription(
        &self,
        subscription_id: Uuid,
        apply: SubscriptionUpdate<'_>,
    ) -> Res<(Subscription, bool)>;

    // -- Usage --
    async fn insert_usage_events(&self, events: &[UsageEvent]) -> Res<()>;
    /// Events matching `filter`, oldest first.
    async fn get_usage_events(&self, filter: UsageFilter) -> Res<Vec<UsageEvent>>;
}
