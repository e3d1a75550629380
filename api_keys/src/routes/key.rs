use std::sync::Arc;

use actix_web::{
    Responder, delete, get, post,
    web::{self},
};
use chrono::Utc;
use common::{error::Res, http::Success, jwt::JwtClaims, key::SecretHasher};
use db::Store;
use uuid::Uuid;

use crate::{dtos::key::CreateKeyRequest, service};

/// Lists the caller's API keys. Secrets and hashes are never included.
#[get("")]
pub async fn get_keys(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<Arc<dyn Store>>,
) -> Res<impl Responder> {
    let keys = service::key::list_keys(&***store, claims.user_id).await?;
    Success::ok(keys)
}

/// Issues a new API key for the caller.
///
/// The response carries the full `prefix.secret` token. It is shown once and
/// cannot be retrieved again; a lost token has to be rotated.
#[post("")]
pub async fn post_issue_key(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<Arc<dyn Store>>,
    hasher: web::Data<SecretHasher>,
    req: web::Json<CreateKeyRequest>,
) -> Res<impl Responder> {
    let req = req.into_inner();
    let expires_at = service::key::expiry_from_days(req.expires_in_days, Utc::now())?;
    let key = service::key::issue_key(
        &***store,
        &hasher,
        claims.user_id,
        req.name,
        req.allowed_services,
        expires_at,
    )
    .await?;
    Success::created(key)
}

/// Replaces the secret (and prefix) of one of the caller's keys.
#[post("/{key_id}/rotate")]
pub async fn post_rotate_key(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<Arc<dyn Store>>,
    hasher: web::Data<SecretHasher>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let key =
        service::key::rotate_key(&***store, &hasher, path.into_inner(), Some(claims.user_id))
            .await?;
    Success::ok(key)
}

/// Revokes one of the caller's keys. There is no way back.
#[delete("/{key_id}")]
pub async fn delete_key(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let key = service::key::revoke_key(&***store, path.into_inner(), Some(claims.user_id)).await?;
    Success::ok(key)
}

#[get("")]
pub async fn get_all_keys(store: web::Data<Arc<dyn Store>>) -> Res<impl Responder> {
    let keys = service::key::list_all_keys(&***store).await?;
    Success::ok(keys)
}

#[post("/{key_id}/revoke")]
pub async fn post_admin_revoke(
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let key = service::key::revoke_key(&***store, path.into_inner(), None).await?;
    Success::ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpMessage, http::StatusCode, test};
    use common::jwt::ROLE_CLIENT;
    use db::{MemoryStore, dtos::user::UserCreateRequest, models::user::Role};

    async fn app_state() -> (Arc<dyn Store>, JwtClaims) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(UserCreateRequest {
                email: "routes@example.com".to_string(),
                role: Role::Client,
            })
            .await
            .unwrap();
        let claims = JwtClaims {
            user_id: user.id,
            role: ROLE_CLIENT.to_string(),
            exp: usize::MAX,
        };
        (store, claims)
    }

    #[actix_web::test]
    async fn issue_then_list_hides_secret() {
        let (store, claims) = app_state().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store.clone()))
                .app_data(web::Data::new(SecretHasher::new(8, 1, 1).unwrap()))
                .service(crate::mount_keys()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/keys")
            .set_json(serde_json::json!({ "name": "ci", "expires_in_days": 30 }))
            .to_request();
        req.extensions_mut().insert(claims.clone());
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        let token = body["key"].as_str().unwrap().to_string();
        assert!(token.starts_with(body["prefix"].as_str().unwrap()));

        let req = test::TestRequest::get().uri("/keys").to_request();
        req.extensions_mut().insert(claims);
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let listed: serde_json::Value = test::read_body_json(resp).await;
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].get("key").is_none());
        assert!(listed[0].get("secret_hash").is_none());
    }

    #[actix_web::test]
    async fn non_positive_expiry_is_bad_request() {
        let (store, claims) = app_state().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store))
                .app_data(web::Data::new(SecretHasher::new(8, 1, 1).unwrap()))
                .service(crate::mount_keys()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/keys")
            .set_json(serde_json::json!({ "name": "ci", "expires_in_days": 0 }))
            .to_request();
        req.extensions_mut().insert(claims);
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
