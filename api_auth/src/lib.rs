use std::sync::Arc;

use actix_web::web;
use db::Store;
use middleware::auth::AuthMiddleware;

pub mod middleware {
    pub mod auth;
}
pub mod routes {
    pub mod user;
}

/// Management access for any active account.
pub fn auth_middleware(store: Arc<dyn Store>) -> AuthMiddleware {
    AuthMiddleware::new(store, false)
}

/// Management access for active admins only.
pub fn admin_middleware(store: Arc<dyn Store>) -> AuthMiddleware {
    AuthMiddleware::new(store, true)
}

pub fn mount_me() -> actix_web::Scope {
    web::scope("/me").service(routes::user::get_me)
}
