use common::error::{AppError, Res};
use db::{
    Store,
    dtos::user::UserCreateRequest,
    models::user::{Role, User},
};
use uuid::Uuid;

/// Provisions an account. Credentials live with the login service; here the
/// account only needs an identity and a role.
pub async fn create_user(store: &dyn Store, email: &str, role: Role) -> Res<User> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest(format!("Invalid email '{}'", email)));
    }
    let user = store.insert_user(UserCreateRequest { email, role }).await?;
    log::info!("Created {} account {}", user.role.as_str(), user.id);
    Ok(user)
}

pub async fn list_users(store: &dyn Store) -> Res<Vec<User>> {
    store.list_users().await
}

/// Deactivates the account and revokes every key it owns. Reactivating the
/// account later does not bring the keys back.
pub async fn suspend_user(store: &dyn Store, user_id: Uuid) -> Res<User> {
    let user = store.set_user_active(user_id, false).await?;
    let revoked = store.revoke_keys_by_user_id(user_id).await?;
    log::info!("Suspended user {}, revoked {} key(s)", user_id, revoked);
    Ok(user)
}

pub async fn activate_user(store: &dyn Store, user_id: Uuid) -> Res<User> {
    let user = store.set_user_active(user_id, true).await?;
    log::info!("Activated user {}", user_id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::{MemoryStore, dtos::key::KeyCreateRequest};

    #[tokio::test]
    async fn email_is_normalized_and_unique() {
        let store = MemoryStore::new();
        let user = create_user(&store, " Ops@Example.com ", Role::Admin).await.unwrap();
        assert_eq!(user.email, "ops@example.com");
        assert!(user.is_active);

        let err = create_user(&store, "ops@example.com", Role::Client)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn invalid_email_is_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            create_user(&store, "nobody", Role::Client).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn suspension_revokes_keys_for_good() {
        let store = MemoryStore::new();
        let user = create_user(&store, "suspend@example.com", Role::Client)
            .await
            .unwrap();
        let key = store
            .insert_key(KeyCreateRequest {
                user_id: user.id,
                name: "main".to_string(),
                prefix: "susp1234".to_string(),
                secret_hash: "unused".to_string(),
                allowed_services: vec![],
                expires_at: None,
            })
            .await
            .unwrap();

        let suspended = suspend_user(&store, user.id).await.unwrap();
        assert!(!suspended.is_active);

        let reactivated = activate_user(&store, user.id).await.unwrap();
        assert!(reactivated.is_active);

        let key = store.get_key_by_id(key.id).await.unwrap().unwrap();
        assert!(!key.is_active);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            suspend_user(&store, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
