use serde::Deserialize;

pub const DEFAULT_USAGE_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub days: Option<i64>,
}

impl UsageQuery {
    pub fn days(&self) -> i64 {
        self.days.unwrap_or(DEFAULT_USAGE_DAYS)
    }
}
