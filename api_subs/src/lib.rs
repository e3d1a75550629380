use actix_web::web;

pub mod routes {
    pub mod plan;
    pub mod subscription;
    pub mod user;
}

pub mod service {
    pub mod plan;
    pub mod resolver;
    pub mod user;
}

mod dtos {
    pub(crate) mod plan;
    pub(crate) mod subscription;
    pub(crate) mod user;
}

pub use service::resolver::{Authorization, AuthorizationResolver};

pub fn mount_admin_plans() -> actix_web::Scope {
    web::scope("/plans")
        .service(routes::plan::get_plans)
        .service(routes::plan::post_plan)
        .service(routes::plan::get_plan)
        .service(routes::plan::put_plan)
        .service(routes::plan::delete_plan)
}

pub fn mount_admin_subscriptions() -> actix_web::Scope {
    web::scope("/subscriptions")
        .service(routes::subscription::get_subscriptions)
        .service(routes::subscription::post_assign_plan)
}

pub fn mount_admin_users() -> actix_web::Scope {
    web::scope("/users")
        .service(routes::user::get_users)
        .service(routes::user::post_user)
        .service(routes::user::post_suspend)
        .service(routes::user::post_activate)
}

/// The signed-in user's own subscription.
pub fn mount_subscription() -> actix_web::Scope {
    web::scope("/subscription").service(routes::subscription::get_my_subscription)
}
