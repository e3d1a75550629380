use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct UsageFilter {
    pub user_id: Option<Uuid>,
    pub key_id: Option<Uuid>,
    pub since: DateTime<Utc>,
}
