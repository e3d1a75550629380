use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{conflict_or, models::subscription::Subscription};

pub async fn get_subscription_by_user_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_subscriptions<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
) -> Res<Vec<Subscription>> {
    sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions ORDER BY created_at")
        .fetch_all(executor)
        .await
        .map_err(AppError::from)
}

/// A user holds at most one subscription; assigning again replaces the plan
/// and starts a fresh cycle.
pub async fn upsert_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    plan_id: Uuid,
    reset_at: DateTime<Utc>,
) -> Res<Subscription> {
    sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions (id, user_id, plan_id, usage_count, reset_at)
        VALUES ($1, $2, $3, 0, $4)
        ON CONFLICT (user_id) DO UPDATE
        SET plan_id = EXCLUDED.plan_id,
            usage_count = 0,
            reset_at = EXCLUDED.reset_at,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(plan_id)
    .bind(reset_at)
    .fetch_one(executor)
    .await
    .map_err(|e| conflict_or(e, format!("User {} or plan {} does not exist", user_id, plan_id)))
}

/// Reads the row under `FOR UPDATE`, lets `apply` mutate it and writes it back
/// in the same transaction. Concurrent callers for one subscription serialize
/// on the row lock.
pub async fn transact_subscription<F>(
    pool: &PgPool,
    subscription_id: Uuid,
    apply: F,
) -> Res<(Subscription, bool)>
where
    F: FnOnce(&mut Subscription) -> bool,
{
    let mut tx = pool.begin().await?;

    let mut subscription =
        sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1 FOR UPDATE")
            .bind(subscription_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Subscription {}", subscription_id)))?;

    let admitted = apply(&mut subscription);

    let subscription = sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET usage_count = $1, reset_at = $2, updated_at = now()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(subscription.usage_count)
    .bind(subscription.reset_at)
    .bind(subscription_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok((subscription, admitted))
}
