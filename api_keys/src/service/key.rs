use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use common::{
    error::{AppError, Res},
    key::{GeneratedKey, SecretHasher},
    misc::normalize_scopes,
};
use db::{
    Store,
    dtos::key::{KeyCreateRequest, KeyRotateRequest},
    models::key::ApiKey,
};
use serde::Serialize;
use uuid::Uuid;

use crate::dtos::key::ApiKeyListItem;

/// Prefixes are 32 random bits, so a clash is rare but possible.
const MATERIAL_ATTEMPTS: usize = 3;

/// Response to issuing or rotating a key. `key` is the only copy of the
/// plaintext token and is never stored.
#[derive(Debug, Serialize)]
pub struct IssuedKey {
    pub id: Uuid,
    pub name: String,
    pub prefix: String,
    pub key: String,
    pub allowed_services: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl IssuedKey {
    fn new(key: ApiKey, material: &GeneratedKey) -> Self {
        IssuedKey {
            id: key.id,
            name: key.name,
            prefix: key.prefix,
            key: material.token(),
            allowed_services: key.allowed_services,
            is_active: key.is_active,
            created_at: key.created_at,
            expires_at: key.expires_at,
        }
    }
}

/// Hashes off the async workers; argon2 is deliberately slow.
pub(crate) async fn hash_secret(hasher: &SecretHasher, secret: &str) -> Res<String> {
    let hasher = hasher.clone();
    let secret = secret.to_string();
    tokio::task::spawn_blocking(move || hasher.hash(&secret))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

/// Generates key material and hands prefix and hash to `persist`, retrying
/// with new material when the prefix is already taken.
async fn with_fresh_material<F, Fut>(hasher: &SecretHasher, mut persist: F) -> Res<IssuedKey>
where
    F: FnMut(String, String) -> Fut,
    Fut: Future<Output = Res<ApiKey>>,
{
    let mut attempt = 1;
    loop {
        let material = GeneratedKey::generate();
        let secret_hash = hash_secret(hasher, &material.secret).await?;

        match persist(material.prefix.clone(), secret_hash).await {
            Ok(key) => return Ok(IssuedKey::new(key, &material)),
            Err(AppError::Conflict(message)) if attempt < MATERIAL_ATTEMPTS => {
                log::warn!("Regenerating key material: {}", message);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn expiry_from_days(days: Option<i64>, now: DateTime<Utc>) -> Res<Option<DateTime<Utc>>> {
    match days {
        None => Ok(None),
        Some(days) if days > 0 => now
            .checked_add_signed(Duration::days(days))
            .map(Some)
            .ok_or_else(|| AppError::BadRequest("expires_in_days is too large".to_string())),
        Some(_) => Err(AppError::BadRequest(
            "expires_in_days must be positive".to_string(),
        )),
    }
}

/// Creates a key for `user_id` and returns its plaintext token once.
pub async fn issue_key(
    store: &dyn Store,
    hasher: &SecretHasher,
    user_id: Uuid,
    name: String,
    allowed_services: Vec<String>,
    expires_at: Option<DateTime<Utc>>,
) -> Res<IssuedKey> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Key name must not be empty".to_string()));
    }
    if expires_at.is_some_and(|expires_at| expires_at <= Utc::now()) {
        return Err(AppError::BadRequest(
            "Key expiry must be in the future".to_string(),
        ));
    }
    if store.get_user_by_id(user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("User {}", user_id)));
    }

    let allowed_services = normalize_scopes(allowed_services);
    let issued = with_fresh_material(hasher, |prefix, secret_hash| {
        store.insert_key(KeyCreateRequest {
            user_id,
            name: name.clone(),
            prefix,
            secret_hash,
            allowed_services: allowed_services.clone(),
            expires_at,
        })
    })
    .await?;

    log::info!("Issued API key {} ({}) for user {}", issued.id, issued.prefix, user_id);
    Ok(issued)
}

/// Looks a key up, hiding keys of other users behind `NotFound`.
async fn owned_key(store: &dyn Store, key_id: Uuid, owner: Option<Uuid>) -> Res<ApiKey> {
    match store.get_key_by_id(key_id).await? {
        Some(key) if owner.is_none_or(|owner| owner == key.user_id) => Ok(key),
        _ => Err(AppError::NotFound(format!("API key {}", key_id))),
    }
}

/// Replaces prefix and secret of an active key. The old token stops working
/// immediately; id, owner, name, scopes and expiry stay.
///
/// `owner` restricts the operation to keys of that user.
pub async fn rotate_key(
    store: &dyn Store,
    hasher: &SecretHasher,
    key_id: Uuid,
    owner: Option<Uuid>,
) -> Res<IssuedKey> {
    let key = owned_key(store, key_id, owner).await?;
    if !key.is_active {
        return Err(AppError::Conflict(
            "Revoked keys cannot be rotated".to_string(),
        ));
    }

    let issued = with_fresh_material(hasher, |prefix, secret_hash| {
        store.rotate_key(key_id, KeyRotateRequest { prefix, secret_hash })
    })
    .await?;

    log::info!("Rotated API key {} (now {})", key_id, issued.prefix);
    Ok(issued)
}

/// Permanently disables a key.
pub async fn revoke_key(store: &dyn Store, key_id: Uuid, owner: Option<Uuid>) -> Res<ApiKeyListItem> {
    owned_key(store, key_id, owner).await?;
    let key = store.revoke_key(key_id).await?;
    log::info!("Revoked API key {}", key_id);
    Ok(key.into())
}

pub async fn list_keys(store: &dyn Store, user_id: Uuid) -> Res<Vec<ApiKeyListItem>> {
    Ok(store
        .get_keys_by_user_id(user_id)
        .await?
        .into_iter()
        .map(ApiKeyListItem::from)
        .collect())
}

pub async fn list_all_keys(store: &dyn Store) -> Res<Vec<ApiKeyListItem>> {
    Ok(store
        .list_keys()
        .await?
        .into_iter()
        .map(ApiKeyListItem::from)
        .collect())
}
