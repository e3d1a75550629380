use actix_web::{Responder, get, web};
use common::http::Success;
use db::models::user::User;

/// The account behind the bearer token, as loaded by the auth middleware.
#[get("")]
async fn get_me(user: web::ReqData<User>) -> impl Responder {
    Success::ok(user.into_inner())
}
