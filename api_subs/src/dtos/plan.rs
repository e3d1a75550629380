use db::dtos::plan::{PlanCreateRequest, PlanUpdateRequest};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub monthly_limit: i64,
    pub rate_limit_per_minute: i32,
    #[serde(default)]
    pub allowed_services: Vec<String>,
}

impl From<CreatePlanRequest> for PlanCreateRequest {
    fn from(req: CreatePlanRequest) -> Self {
        PlanCreateRequest {
            name: req.name,
            monthly_limit: req.monthly_limit,
            rate_limit_per_minute: req.rate_limit_per_minute,
            allowed_services: req.allowed_services,
        }
    }
}

/// Partial update; absent fields stay as they are.
#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub monthly_limit: Option<i64>,
    pub rate_limit_per_minute: Option<i32>,
    pub allowed_services: Option<Vec<String>>,
}

impl From<UpdatePlanRequest> for PlanUpdateRequest {
    fn from(req: UpdatePlanRequest) -> Self {
        PlanUpdateRequest {
            name: req.name,
            monthly_limit: req.monthly_limit,
            rate_limit_per_minute: req.rate_limit_per_minute,
            allowed_services: req.allowed_services,
        }
    }
}
