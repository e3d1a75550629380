use chrono::{DateTime, Utc};
use db::models::key::ApiKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    #[serde(default)]
    pub allowed_services: Vec<String>,
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyListItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub prefix: String,
    pub allowed_services: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub rotated_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeyListItem {
    fn from(key: ApiKey) -> Self {
        ApiKeyListItem {
            id: key.id,
            user_id: key.user_id,
            name: key.name,
            prefix: key.prefix,
            allowed_services: key.allowed_services,
            is_active: key.is_active,
            created_at: key.created_at,
            expires_at: key.expires_at,
            rotated_at: key.rotated_at,
        }
    }
}
