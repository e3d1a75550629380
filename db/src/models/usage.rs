use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::error::AppError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Rejected,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Rejected => "rejected",
        }
    }
}

impl FromStr for Outcome {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "success" => Ok(Outcome::Success),
            "failure" => Ok(Outcome::Failure),
            "rejected" => Ok(Outcome::Rejected),
            other => Err(AppError::Internal(format!("Unknown usage outcome '{}'", other))),
        }
    }
}

/// One request that reached the gatekeeper. Never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct UsageEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub key_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub endpoint: String,
    pub outcome: Outcome,
    /// Stable reason code for rejections and failures.
    pub reason: Option<String>,
}
