use crate::models::user::Role;

pub struct UserCreateRequest {
    pub email: String,
    pub role: Role,
}
