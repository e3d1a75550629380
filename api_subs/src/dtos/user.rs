use db::models::user::Role;
use serde::Deserialize;

fn default_role() -> Role {
    Role::Client
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default = "default_role")]
    pub role: Role,
}
