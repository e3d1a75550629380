use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use chrono::Utc;
use common::{cycle::CycleLength, error::Res, http::Success, jwt::JwtClaims};
use db::Store;

use crate::{
    dtos::subscription::{AssignPlanRequest, SubscriptionOverview},
    service,
};

#[get("")]
pub async fn get_subscriptions(store: web::Data<Arc<dyn Store>>) -> Res<impl Responder> {
    let subscriptions = service::plan::list_subscriptions(&***store).await?;
    Success::ok(subscriptions)
}

/// Assigns a plan to a user, replacing any current subscription. Usage starts
/// again from zero.
#[post("")]
pub async fn post_assign_plan(
    store: web::Data<Arc<dyn Store>>,
    cycle: web::Data<CycleLength>,
    req: web::Json<AssignPlanRequest>,
) -> Res<impl Responder> {
    let subscription = service::plan::assign_plan(
        &***store,
        **cycle,
        req.user_id,
        req.plan_id,
        Utc::now(),
    )
    .await?;
    Success::ok(subscription)
}

#[get("")]
pub async fn get_my_subscription(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<Arc<dyn Store>>,
) -> Res<impl Responder> {
    let subscription = service::plan::get_subscription(&***store, claims.user_id).await?;
    let plan = service::plan::get_plan(&***store, subscription.plan_id).await?;
    Success::ok(SubscriptionOverview {
        remaining: (plan.monthly_limit - subscription.usage_count).max(0),
        subscription,
        plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpMessage, http::StatusCode, test};
    use db::{
        MemoryStore,
        dtos::{plan::PlanCreateRequest, user::UserCreateRequest},
        models::user::Role,
    };

    #[actix_web::test]
    async fn assign_then_read_own_subscription() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(UserCreateRequest {
                email: "dash@example.com".to_string(),
                role: Role::Client,
            })
            .await
            .unwrap();
        let plan = store
            .insert_plan(PlanCreateRequest {
                name: "pro".to_string(),
                monthly_limit: 1000,
                rate_limit_per_minute: 60,
                allowed_services: vec![],
            })
            .await
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store.clone()))
                .app_data(web::Data::new(CycleLength::CalendarMonth))
                .service(crate::mount_admin_subscriptions())
                .service(crate::mount_subscription()),
        )
        .await;

        let claims = JwtClaims {
            user_id: user.id,
            role: Role::Client.as_str().to_string(),
            exp: usize::MAX,
        };

        let req = test::TestRequest::get().uri("/subscription").to_request();
        req.extensions_mut().insert(claims.clone());
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/subscriptions")
            .set_json(serde_json::json!({ "user_id": user.id, "plan_id": plan.id }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/subscription").to_request();
        req.extensions_mut().insert(claims);
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["usage_count"], 0);
        assert_eq!(body["remaining"], 1000);
        assert_eq!(body["plan"]["name"], "pro");
    }
}
