use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    conflict_or,
    dtos::key::{KeyCreateRequest, KeyRotateRequest},
    models::key::ApiKey,
};

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    prefix: String,
    secret_hash: String,
    allowed_services: Vec<String>,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
    rotated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<ApiKeyRow> for ApiKey {
    fn from(row: ApiKeyRow) -> Self {
        ApiKey {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            prefix: row.prefix,
            secret_hash: row.secret_hash,
            allowed_services: row.allowed_services,
            is_active: row.is_active,
            created_at: row.created_at,
            expires_at: row.expires_at,
            rotated_at: row.rotated_at,
        }
    }
}

pub async fn get_key_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    key_id: Uuid,
) -> Res<Option<ApiKey>> {
    let row = sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys WHERE id = $1")
        .bind(key_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(ApiKey::from))
}

/// Indexed lookup by the public half of a token.
pub async fn get_key_by_prefix<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    prefix: &str,
) -> Res<Option<ApiKey>> {
    let row = sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys WHERE prefix = $1")
        .bind(prefix)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(ApiKey::from))
}

pub async fn get_keys_by_user_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Vec<ApiKey>> {
    let rows = sqlx::query_as::<_, ApiKeyRow>(
        "SELECT * FROM api_keys WHERE user_id = $1 ORDER BY created_at",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(ApiKey::from).collect())
}

pub async fn get_keys<'e, E: Executor<'e, Database = Postgres>>(executor: E) -> Res<Vec<ApiKey>> {
    let rows = sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys ORDER BY created_at")
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(ApiKey::from).collect())
}

pub async fn insert_key<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: KeyCreateRequest,
) -> Res<ApiKey> {
    sqlx::query_as::<_, ApiKeyRow>(
        r#"
        INSERT INTO api_keys (id, user_id, name, prefix, secret_hash, allowed_services, is_active, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(data.user_id)
    .bind(&data.name)
    .bind(&data.prefix)
    .bind(&data.secret_hash)
    .bind(&data.allowed_services)
    .bind(data.expires_at)
    .fetch_one(executor)
    .await
    .map(ApiKey::from)
    .map_err(|e| conflict_or(e, format!("Key prefix {} is already taken", data.prefix)))
}

/// Swaps in new key material. Only active keys can be rotated; returns `None`
/// when no active key with this id exists.
pub async fn update_key_secret<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    key_id: Uuid,
    data: KeyRotateRequest,
) -> Res<Option<ApiKey>> {
    sqlx::query_as::<_, ApiKeyRow>(
        r#"
        UPDATE api_keys
        SET prefix = $1, secret_hash = $2, rotated_at = now()
        WHERE id = $3 AND is_active
        RETURNING *
        "#,
    )
    .bind(&data.prefix)
    .bind(&data.secret_hash)
    .bind(key_id)
    .fetch_optional(executor)
    .await
    .map(|row| row.map(ApiKey::from))
    .map_err(|e| conflict_or(e, format!("Key prefix {} is already taken", data.prefix)))
}

/// One-way transition; there is deliberately no statement that sets `is_active` back.
pub async fn deactivate_key<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    key_id: Uuid,
) -> Res<ApiKey> {
    sqlx::query_as::<_, ApiKeyRow>(
        "UPDATE api_keys SET is_active = FALSE WHERE id = $1 RETURNING *",
    )
    .bind(key_id)
    .fetch_optional(executor)
    .await?
    .map(ApiKey::from)
    .ok_or_else(|| AppError::NotFound(format!("API key {}", key_id)))
}

pub async fn deactivate_keys_by_user_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<u64> {
    let result =
        sqlx::query("UPDATE api_keys SET is_active = FALSE WHERE user_id = $1 AND is_active")
            .bind(user_id)
            .execute(executor)
            .await?;
    Ok(result.rows_affected())
}
