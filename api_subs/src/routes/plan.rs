use std::sync::Arc;

use actix_web::{Responder, delete, get, post, put, web};
use common::{error::Res, http::Success};
use db::Store;
use uuid::Uuid;

use crate::{
    dtos::plan::{CreatePlanRequest, UpdatePlanRequest},
    service,
};

#[get("")]
pub async fn get_plans(store: web::Data<Arc<dyn Store>>) -> Res<impl Responder> {
    let plans = service::plan::list_plans(&***store).await?;
    Success::ok(plans)
}

#[post("")]
pub async fn post_plan(
    store: web::Data<Arc<dyn Store>>,
    req: web::Json<CreatePlanRequest>,
) -> Res<impl Responder> {
    let plan = service::plan::create_plan(&***store, req.into_inner().into()).await?;
    Success::created(plan)
}

#[get("/{plan_id}")]
pub async fn get_plan(
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let plan = service::plan::get_plan(&***store, path.into_inner()).await?;
    Success::ok(plan)
}

#[put("/{plan_id}")]
pub async fn put_plan(
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<Uuid>,
    req: web::Json<UpdatePlanRequest>,
) -> Res<impl Responder> {
    let plan =
        service::plan::update_plan(&***store, path.into_inner(), req.into_inner().into()).await?;
    Success::ok(plan)
}

/// Fails with 409 while a subscription still uses the plan.
#[delete("/{plan_id}")]
pub async fn delete_plan(
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    service::plan::delete_plan(&***store, path.into_inner()).await?;
    Success::ok(serde_json::json!({ "message": "Plan deleted" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use db::MemoryStore;

    #[actix_web::test]
    async fn plan_lifecycle_over_http() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store.clone()))
                .service(crate::mount_admin_plans()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/plans")
            .set_json(serde_json::json!({
                "name": "Starter",
                "monthly_limit": 1000,
                "rate_limit_per_minute": 10,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: serde_json::Value = test::read_body_json(resp).await;
        let id = created["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::put()
            .uri(&format!("/plans/{}", id))
            .set_json(serde_json::json!({ "monthly_limit": 5000 }))
            .to_request();
        let updated: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["monthly_limit"], 5000);
        assert_eq!(updated["name"], "Starter");

        let req = test::TestRequest::get().uri("/plans").to_request();
        let listed: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let req = test::TestRequest::delete()
            .uri(&format!("/plans/{}", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri(&format!("/plans/{}", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
