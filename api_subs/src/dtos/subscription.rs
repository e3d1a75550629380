use db::models::{plan::Plan, subscription::Subscription};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AssignPlanRequest {
    pub user_id: Uuid,
    pub plan_id: Uuid,
}

/// Dashboard view: the subscription together with the limits it runs under.
#[derive(Debug, Serialize)]
pub struct SubscriptionOverview {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub plan: Plan,
    pub remaining: i64,
}
