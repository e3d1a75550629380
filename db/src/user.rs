use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    conflict_or,
    dtos::user::UserCreateRequest,
    models::user::User,
};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Res<Self> {
        Ok(User {
            id: row.id,
            email: row.email,
            role: row.role.parse()?,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

pub async fn get_user_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Option<User>> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .map(User::try_from)
        .transpose()
}

pub async fn get_users<'e, E: Executor<'e, Database = Postgres>>(executor: E) -> Res<Vec<User>> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY created_at")
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect()
}

pub async fn insert_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: UserCreateRequest,
) -> Res<User> {
    sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (id, email, role, is_active)
        VALUES ($1, $2, $3, TRUE)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&data.email)
    .bind(data.role.as_str())
    .fetch_one(executor)
    .await
    .map_err(|e| conflict_or(e, format!("User with email {} already exists", data.email)))?
    .try_into()
}

pub async fn update_user_active<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    is_active: bool,
) -> Res<User> {
    sqlx::query_as::<_, UserRow>("UPDATE users SET is_active = $1 WHERE id = $2 RETURNING *")
        .bind(is_active)
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?
        .try_into()
}
