use std::sync::Arc;

use common::{error::Res, misc::scope_allows, reject::RejectReason};
use db::{
    Store,
    models::{key::ApiKey, plan::Plan, subscription::Subscription, user::User},
};

/// Everything the later gate stages need about a verified key.
#[derive(Debug, Clone)]
pub struct Authorization {
    pub user: User,
    pub plan: Plan,
    pub subscription: Subscription,
}

/// Decides whether a verified key may call an endpoint. Read-only.
#[derive(Clone)]
pub struct AuthorizationResolver {
    store: Arc<dyn Store>,
}

impl AuthorizationResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        AuthorizationResolver { store }
    }

    /// The outer `Res` carries storage failures, the inner `Result` the gate
    /// decision.
    pub async fn resolve(
        &self,
        key: &ApiKey,
        endpoint: &str,
    ) -> Res<Result<Authorization, RejectReason>> {
        let user = match self.store.get_user_by_id(key.user_id).await? {
            Some(user) if user.is_active => user,
            _ => return Ok(Err(RejectReason::AccountSuspended)),
        };

        let Some(subscription) = self.store.get_subscription_by_user_id(user.id).await? else {
            return Ok(Err(RejectReason::NoActivePlan));
        };
        let Some(plan) = self.store.get_plan_by_id(subscription.plan_id).await? else {
            log::warn!(
                "Subscription {} points at missing plan {}",
                subscription.id,
                subscription.plan_id
            );
            return Ok(Err(RejectReason::NoActivePlan));
        };

        if !scope_allows(&key.allowed_services, endpoint)
            || !scope_allows(&plan.allowed_services, endpoint)
        {
            return Ok(Err(RejectReason::ServiceNotAllowed));
        }

        Ok(Ok(Authorization {
            user,
            plan,
            subscription,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use db::{
        MemoryStore,
        dtos::{key::KeyCreateRequest, plan::PlanCreateRequest, user::UserCreateRequest},
        models::user::Role,
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        resolver: AuthorizationResolver,
        key: ApiKey,
    }

    async fn fixture(key_scopes: &[&str], plan_scopes: &[&str], subscribe: bool) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(UserCreateRequest {
                email: "resolver@example.com".to_string(),
                role: Role::Client,
            })
            .await
            .unwrap();
        let key = store
            .insert_key(KeyCreateRequest {
                user_id: user.id,
                name: "main".to_string(),
                prefix: "res01234".to_string(),
                secret_hash: "unused".to_string(),
                allowed_services: key_scopes.iter().map(|s| s.to_string()).collect(),
                expires_at: None,
            })
            .await
            .unwrap();
        if subscribe {
            let plan = store
                .insert_plan(PlanCreateRequest {
                    name: "basic".to_string(),
                    monthly_limit: 10,
                    rate_limit_per_minute: 5,
                    allowed_services: plan_scopes.iter().map(|s| s.to_string()).collect(),
                })
                .await
                .unwrap();
            store
                .upsert_subscription(user.id, plan.id, Utc::now() + Duration::days(30))
                .await
                .unwrap();
        }
        Fixture {
            resolver: AuthorizationResolver::new(store.clone()),
            store,
            key,
        }
    }

    #[tokio::test]
    async fn resolves_user_plan_and_subscription() {
        let f = fixture(&[], &[], true).await;
        let auth = f.resolver.resolve(&f.key, "weather").await.unwrap().unwrap();
        assert_eq!(auth.user.id, f.key.user_id);
        assert_eq!(auth.subscription.plan_id, auth.plan.id);
    }

    #[tokio::test]
    async fn key_scope_narrows_access() {
        let f = fixture(&["weather"], &[], true).await;
        assert!(f.resolver.resolve(&f.key, "weather").await.unwrap().is_ok());
        assert_eq!(
            f.resolver.resolve(&f.key, "currency").await.unwrap().unwrap_err(),
            RejectReason::ServiceNotAllowed
        );
    }

    #[tokio::test]
    async fn plan_scope_narrows_access() {
        let f = fixture(&[], &["currency"], true).await;
        assert_eq!(
            f.resolver.resolve(&f.key, "weather").await.unwrap().unwrap_err(),
            RejectReason::ServiceNotAllowed
        );
    }

    #[tokio::test]
    async fn missing_subscription_means_no_plan() {
        let f = fixture(&[], &[], false).await;
        assert_eq!(
            f.resolver.resolve(&f.key, "weather").await.unwrap().unwrap_err(),
            RejectReason::NoActivePlan
        );
    }

    #[tokio::test]
    async fn suspended_owner_is_rejected() {
        let f = fixture(&[], &[], true).await;
        f.store.set_user_active(f.key.user_id, false).await.unwrap();
        assert_eq!(
            f.resolver.resolve(&f.key, "weather").await.unwrap().unwrap_err(),
            RejectReason::AccountSuspended
        );
    }
}
