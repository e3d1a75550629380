use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct KeyCreateRequest {
    pub user_id: Uuid,
    pub name: String,
    pub prefix: String,
    pub secret_hash: String,
    pub allowed_services: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Fresh key material for an existing key row.
pub struct KeyRotateRequest {
    pub prefix: String,
    pub secret_hash: String,
}
