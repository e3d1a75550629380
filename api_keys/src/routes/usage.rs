use std::sync::Arc;

use actix_web::{
    Responder, get,
    web::{self},
};
use chrono::Utc;
use common::{
    error::{AppError, Res},
    http::Success,
    jwt::JwtClaims,
};
use db::Store;
use logger::report::{UsageScope, query_usage};
use uuid::Uuid;

use crate::dtos::usage::UsageQuery;

/// Usage statistics across all of the caller's keys.
#[get("")]
pub async fn get_own_usage(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<Arc<dyn Store>>,
    query: web::Query<UsageQuery>,
) -> Res<impl Responder> {
    let stats = query_usage(
        &***store,
        UsageScope::User(claims.user_id),
        query.days(),
        Utc::now(),
    )
    .await?;
    Success::ok(stats)
}

/// Usage statistics for one of the caller's keys.
#[get("/key/{key_id}")]
pub async fn get_own_key_usage(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<Uuid>,
    query: web::Query<UsageQuery>,
) -> Res<impl Responder> {
    let key_id = path.into_inner();
    match store.get_key_by_id(key_id).await? {
        Some(key) if key.user_id == claims.user_id => {}
        _ => return Err(AppError::NotFound(format!("API key {}", key_id))),
    }

    let stats = query_usage(&***store, UsageScope::Key(key_id), query.days(), Utc::now()).await?;
    Success::ok(stats)
}

#[get("")]
pub async fn get_global_usage(
    store: web::Data<Arc<dyn Store>>,
    query: web::Query<UsageQuery>,
) -> Res<impl Responder> {
    let stats = query_usage(&***store, UsageScope::Global, query.days(), Utc::now()).await?;
    Success::ok(stats)
}

#[get("/user/{user_id}")]
pub async fn get_user_usage(
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<Uuid>,
    query: web::Query<UsageQuery>,
) -> Res<impl Responder> {
    let stats = query_usage(
        &***store,
        UsageScope::User(path.into_inner()),
        query.days(),
        Utc::now(),
    )
    .await?;
    Success::ok(stats)
}

#[get("/key/{key_id}")]
pub async fn get_key_usage(
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<Uuid>,
    query: web::Query<UsageQuery>,
) -> Res<impl Responder> {
    let stats = query_usage(
        &***store,
        UsageScope::Key(path.into_inner()),
        query.days(),
        Utc::now(),
    )
    .await?;
    Success::ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpMessage, http::StatusCode, test};
    use db::{
        MemoryStore,
        dtos::user::UserCreateRequest,
        models::{
            usage::{Outcome, UsageEvent},
            user::Role,
        },
    };

    fn event(user_id: Uuid, endpoint: &str, outcome: Outcome) -> UsageEvent {
        UsageEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            key_id: None,
            user_id: Some(user_id),
            endpoint: endpoint.to_string(),
            outcome,
            reason: None,
        }
    }

    #[actix_web::test]
    async fn own_usage_counts_only_the_caller() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(UserCreateRequest {
                email: "usage@example.com".to_string(),
                role: Role::Client,
            })
            .await
            .unwrap();
        store
            .insert_usage_events(&[
                event(user.id, "weather", Outcome::Success),
                event(user.id, "currency", Outcome::Rejected),
                event(Uuid::new_v4(), "weather", Outcome::Success),
            ])
            .await
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store))
                .service(crate::mount_usage())
                .service(web::scope("/admin").service(crate::mount_admin_usage())),
        )
        .await;

        let req = test::TestRequest::get().uri("/usage?days=7").to_request();
        req.extensions_mut().insert(JwtClaims {
            user_id: user.id,
            role: Role::Client.as_str().to_string(),
            exp: usize::MAX,
        });
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_requests"], 2);
        assert_eq!(body["successful_requests"], 1);
        assert_eq!(body["rejected_requests"], 1);

        let req = test::TestRequest::get().uri("/admin/usage").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_requests"], 3);
        assert_eq!(body["requests_by_endpoint"]["weather"], 2);
    }

    #[actix_web::test]
    async fn window_outside_a_year_is_rejected() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store))
                .service(crate::mount_admin_usage()),
        )
        .await;

        for days in ["0", "366"] {
            let req = test::TestRequest::get()
                .uri(&format!("/usage?days={}", days))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
    }
}
