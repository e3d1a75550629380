use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{cycle::CycleLength, error::Res};
use db::{Store, models::subscription::Subscription};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum QuotaDecision {
    /// The call was charged; `subscription` reflects the committed count.
    Admitted { subscription: Subscription },
    Exhausted { retry_after_secs: u64 },
}

/// Monthly usage accounting on top of the store's row-level transactions.
#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn Store>,
    cycle: CycleLength,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn Store>, cycle: CycleLength) -> Self {
        Self { store, cycle }
    }

    /// Rolls the cycle forward if `reset_at` has passed, then charges one call
    /// unless the limit is reached. Both happen under the subscription's lock
    /// and are committed before this returns.
    pub async fn consume(
        &self,
        subscription_id: Uuid,
        monthly_limit: i64,
        now: DateTime<Utc>,
    ) -> Res<QuotaDecision> {
        let cycle = self.cycle;
        let charge = move |subscription: &mut Subscription| {
            if let Some(next_reset) = cycle.roll_forward(subscription.reset_at, now) {
                subscription.usage_count = 0;
                subscription.reset_at = next_reset;
            }

            if subscription.usage_count < monthly_limit {
                subscription.usage_count += 1;
                true
            } else {
                false
            }
        };

        let (subscription, admitted) = self
            .store
            .transact_subscription(subscription_id, &charge)
            .await?;

        if admitted {
            log::debug!(
                "Charged subscription {} ({}/{})",
                subscription.id,
                subscription.usage_count,
                monthly_limit
            );
            return Ok(QuotaDecision::Admitted { subscription });
        }

        let left = (subscription.reset_at - now).num_milliseconds();
        Ok(QuotaDecision::Exhausted {
            retry_after_secs: ((left + 999) / 1000).max(1) as u64,
        })
    }
}
