pub struct PlanCreateRequest {
    pub name: String,
    pub monthly_limit: i64,
    pub rate_limit_per_minute: i32,
    pub allowed_services: Vec<String>,
}

#[derive(Default)]
pub struct PlanUpdateRequest {
    pub name: Option<String>,
    pub monthly_limit: Option<i64>,
    pub rate_limit_per_minute: Option<i32>,
    pub allowed_services: Option<Vec<String>>,
}

impl PlanUpdateRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.monthly_limit.is_none()
            && self.rate_limit_per_minute.is_none()
            && self.allowed_services.is_none()
    }
}
