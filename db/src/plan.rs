use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    conflict_or,
    dtos::plan::{PlanCreateRequest, PlanUpdateRequest},
    models::plan::Plan,
};

pub async fn get_plan_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    plan_id: Uuid,
) -> Res<Option<Plan>> {
    sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
        .bind(plan_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_plans<'e, E: Executor<'e, Database = Postgres>>(executor: E) -> Res<Vec<Plan>> {
    sqlx::query_as::<_, Plan>("SELECT * FROM plans ORDER BY created_at")
        .fetch_all(executor)
        .await
        .map_err(AppError::from)
}

pub async fn insert_plan<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: PlanCreateRequest,
) -> Res<Plan> {
    sqlx::query_as::<_, Plan>(
        r#"
        INSERT INTO plans (id, name, monthly_limit, rate_limit_per_minute, allowed_services)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&data.name)
    .bind(data.monthly_limit)
    .bind(data.rate_limit_per_minute)
    .bind(&data.allowed_services)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

/// Only the fields present in `data` change.
pub async fn update_plan<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    plan_id: Uuid,
    data: PlanUpdateRequest,
) -> Res<Plan> {
    sqlx::query_as::<_, Plan>(
        r#"
        UPDATE plans
        SET name = COALESCE($1, name),
            monthly_limit = COALESCE($2, monthly_limit),
            rate_limit_per_minute = COALESCE($3, rate_limit_per_minute),
            allowed_services = COALESCE($4, allowed_services),
            updated_at = now()
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(data.name)
    .bind(data.monthly_limit)
    .bind(data.rate_limit_per_minute)
    .bind(data.allowed_services)
    .bind(plan_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Plan {}", plan_id)))
}

pub async fn delete_plan<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    plan_id: Uuid,
) -> Res<()> {
    let result = sqlx::query("DELETE FROM plans WHERE id = $1")
        .bind(plan_id)
        .execute(executor)
        .await
        .map_err(|e| conflict_or(e, format!("Plan {} still has subscribers", plan_id)))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Plan {}", plan_id)));
    }
    Ok(())
}
