use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use common::error::{AppError, Res};
use db::{
    Store,
    dtos::usage::UsageFilter,
    models::usage::{Outcome, UsageEvent},
};
use serde::Serialize;
use uuid::Uuid;

pub const MAX_USAGE_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageScope {
    Global,
    User(Uuid),
    Key(Uuid),
}

/// Totals over a window of usage events.
///
/// `failed_requests` is everything that did not succeed, rejections
/// included; `rejected_requests` is the gatekeeper's share of it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rejected_requests: u64,
    pub requests_by_endpoint: BTreeMap<String, u64>,
    /// Keyed by UTC day, `YYYY-MM-DD`.
    pub requests_by_day: BTreeMap<String, u64>,
}

impl UsageStats {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a UsageEvent>) -> Self {
        let mut stats = UsageStats::default();
        for event in events {
            stats.total_requests += 1;
            match event.outcome {
                Outcome::Success => stats.successful_requests += 1,
                Outcome::Rejected => stats.rejected_requests += 1,
                Outcome::Failure => {}
            }
            *stats
                .requests_by_endpoint
                .entry(event.endpoint.clone())
                .or_default() += 1;
            *stats
                .requests_by_day
                .entry(event.timestamp.format("%Y-%m-%d").to_string())
                .or_default() += 1;
        }
        stats.failed_requests = stats.total_requests - stats.successful_requests;
        stats
    }
}

/// Reduces the events of the last `since_days` days within `scope`.
pub async fn query_usage(
    store: &dyn Store,
    scope: UsageScope,
    since_days: i64,
    now: DateTime<Utc>,
) -> Res<UsageStats> {
    if !(1..=MAX_USAGE_DAYS).contains(&since_days) {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_USAGE_DAYS
        )));
    }

    let (user_id, key_id) = match scope {
        UsageScope::Global => (None, None),
        UsageScope::User(user_id) => (Some(user_id), None),
        UsageScope::Key(key_id) => (None, Some(key_id)),
    };

    let events = store
        .get_usage_events(UsageFilter {
            user_id,
            key_id,
            since: now - Duration::days(since_days),
        })
        .await?;

    Ok(UsageStats::from_events(&events))
}
