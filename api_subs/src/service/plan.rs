use chrono::{DateTime, Utc};
use common::{
    cycle::CycleLength,
    error::{AppError, Res},
    misc::normalize_scopes,
};
use db::{
    Store,
    dtos::plan::{PlanCreateRequest, PlanUpdateRequest},
    models::{plan::Plan, subscription::Subscription},
};
use uuid::Uuid;

fn validate_limits(monthly_limit: Option<i64>, rate_limit_per_minute: Option<i32>) -> Res<()> {
    if monthly_limit.is_some_and(|limit| limit < 0) {
        return Err(AppError::BadRequest(
            "monthly_limit must not be negative".to_string(),
        ));
    }
    if rate_limit_per_minute.is_some_and(|limit| limit < 0) {
        return Err(AppError::BadRequest(
            "rate_limit_per_minute must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> Res<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Plan name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

pub async fn create_plan(store: &dyn Store, data: PlanCreateRequest) -> Res<Plan> {
    validate_limits(Some(data.monthly_limit), Some(data.rate_limit_per_minute))?;
    let plan = store
        .insert_plan(PlanCreateRequest {
            name: validate_name(&data.name)?,
            allowed_services: normalize_scopes(data.allowed_services),
            ..data
        })
        .await?;
    log::info!("Created plan {} ({})", plan.name, plan.id);
    Ok(plan)
}

pub async fn list_plans(store: &dyn Store) -> Res<Vec<Plan>> {
    store.list_plans().await
}

pub async fn get_plan(store: &dyn Store, plan_id: Uuid) -> Res<Plan> {
    store
        .get_plan_by_id(plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))
}

/// Applies the given fields. Limits take effect on the next admission check;
/// usage already counted in the running cycle is kept.
pub async fn update_plan(store: &dyn Store, plan_id: Uuid, data: PlanUpdateRequest) -> Res<Plan> {
    if data.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }
    validate_limits(data.monthly_limit, data.rate_limit_per_minute)?;

    let name = data.name.as_deref().map(validate_name).transpose()?;
    let plan = store
        .update_plan(
            plan_id,
            PlanUpdateRequest {
                name,
                allowed_services: data.allowed_services.map(normalize_scopes),
                ..data
            },
        )
        .await?;
    log::info!("Updated plan {}", plan.id);
    Ok(plan)
}

/// Refused with `Conflict` while any subscription still points at the plan.
pub async fn delete_plan(store: &dyn Store, plan_id: Uuid) -> Res<()> {
    store.delete_plan(plan_id).await?;
    log::info!("Deleted plan {}", plan_id);
    Ok(())
}

/// Puts `user_id` on `plan_id`. An existing subscription is replaced and starts
/// a fresh cycle with zero usage.
pub async fn assign_plan(
    store: &dyn Store,
    cycle: CycleLength,
    user_id: Uuid,
    plan_id: Uuid,
    now: DateTime<Utc>,
) -> Res<Subscription> {
    if store.get_user_by_id(user_id).await?.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    get_plan(store, plan_id).await?;

    let subscription = store
        .upsert_subscription(user_id, plan_id, cycle.first_reset_after(now))
        .await?;
    log::info!(
        "Assigned plan {} to user {}, cycle ends {}",
        plan_id,
        user_id,
        subscription.reset_at
    );
    Ok(subscription)
}

pub async fn get_subscription(store: &dyn Store, user_id: Uuid) -> Res<Subscription> {
    store
        .get_subscription_by_user_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No subscription found".to_string()))
}

pub async fn list_subscriptions(store: &dyn Store) -> Res<Vec<Subscription>> {
    store.list_subscriptions().await
}
