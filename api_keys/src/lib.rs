use actix_web::web;

pub mod routes {
    pub mod key;
    pub mod usage;
}

pub mod service {
    pub mod key;
    pub mod verify;
}

mod dtos {
    pub(crate) mod key;
    pub(crate) mod usage;
}

pub use service::{key::IssuedKey, verify::CredentialVerifier};

/// Key management for the signed-in user.
pub fn mount_keys() -> actix_web::Scope {
    web::scope("/keys")
        .service(routes::key::get_keys)
        .service(routes::key::post_issue_key)
        .service(routes::key::post_rotate_key)
        .service(routes::key::delete_key)
}

pub fn mount_admin_keys() -> actix_web::Scope {
    web::scope("/keys")
        .service(routes::key::get_all_keys)
        .service(routes::key::post_admin_revoke)
}

pub fn mount_usage() -> actix_web::Scope {
    web::scope("/usage")
        .service(routes::usage::get_own_usage)
        .service(routes::usage::get_own_key_usage)
}

pub fn mount_admin_usage() -> actix_web::Scope {
    web::scope("/usage")
        .service(routes::usage::get_global_usage)
        .service(routes::usage::get_user_usage)
        .service(routes::usage::get_key_usage)
}
