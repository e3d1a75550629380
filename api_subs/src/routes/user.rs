use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use common::{error::Res, http::Success};
use db::Store;
use uuid::Uuid;

use crate::{dtos::user::CreateUserRequest, service};

#[get("")]
pub async fn get_users(store: web::Data<Arc<dyn Store>>) -> Res<impl Responder> {
    let users = service::user::list_users(&***store).await?;
    Success::ok(users)
}

#[post("")]
pub async fn post_user(
    store: web::Data<Arc<dyn Store>>,
    req: web::Json<CreateUserRequest>,
) -> Res<impl Responder> {
    let user = service::user::create_user(&***store, &req.email, req.role).await?;
    Success::created(user)
}

/// Suspends the account and revokes all of its keys.
#[post("/{user_id}/suspend")]
pub async fn post_suspend(
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let user = service::user::suspend_user(&***store, path.into_inner()).await?;
    Success::ok(user)
}

#[post("/{user_id}/activate")]
pub async fn post_activate(
    store: web::Data<Arc<dyn Store>>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let user = service::user::activate_user(&***store, path.into_inner()).await?;
    Success::ok(user)
}
