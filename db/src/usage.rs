use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    dtos::usage::UsageFilter,
    models::usage::{Outcome, UsageEvent},
};

#[derive(sqlx::FromRow)]
struct UsageEventRow {
    id: Uuid,
    timestamp: DateTime<Utc>,
    key_id: Option<Uuid>,
    user_id: Option<Uuid>,
    endpoint: String,
    outcome: String,
    reason: Option<String>,
}

impl TryFrom<UsageEventRow> for UsageEvent {
    type Error = AppError;

    fn try_from(row: UsageEventRow) -> Res<Self> {
        Ok(UsageEvent {
            id: row.id,
            timestamp: row.timestamp,
            key_id: row.key_id,
            user_id: row.user_id,
            endpoint: row.endpoint,
            outcome: row.outcome.parse::<Outcome>()?,
            reason: row.reason,
        })
    }
}

pub async fn get_usage_events<'e, E>(executor: E, filter: UsageFilter) -> Res<Vec<UsageEvent>>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM usage_events");
    qb.push(" WHERE timestamp >= ").push_bind(filter.since);

    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }

    if let Some(key_id) = filter.key_id {
        qb.push(" AND key_id = ").push_bind(key_id);
    }

    qb.push(" ORDER BY timestamp");

    qb.build_query_as::<UsageEventRow>()
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(UsageEvent::try_from)
        .collect()
}

/// Appends a batch in a single statement.
pub async fn insert_usage_events<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    events: &[UsageEvent],
) -> Res<()> {
    if events.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO usage_events (id, timestamp, key_id, user_id, endpoint, outcome, reason) ",
    );
    qb.push_values(events, |mut row, event| {
        row.push_bind(event.id)
            .push_bind(event.timestamp)
            .push_bind(event.key_id)
            .push_bind(event.user_id)
            .push_bind(&event.endpoint)
            .push_bind(event.outcome.as_str())
            .push_bind(&event.reason);
    });

    qb.build().execute(executor).await?;
    Ok(())
}
