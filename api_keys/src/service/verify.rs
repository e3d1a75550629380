use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{
    error::{AppError, Res},
    key::{GeneratedKey, KeyToken, SecretHasher},
    reject::RejectReason,
};
use db::{Store, models::key::ApiKey};

/// Turns a raw `prefix.secret` token into the key record it names.
///
/// Read-only. An unknown prefix still costs one hash verification (against
/// a decoy hash) so that response timing does not reveal which half of the
/// token was wrong.
pub struct CredentialVerifier {
    store: Arc<dyn Store>,
    hasher: SecretHasher,
    decoy_hash: String,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn Store>, hasher: SecretHasher) -> Res<Self> {
        let decoy_hash = hasher.hash(&GeneratedKey::generate().secret)?;
        Ok(Self {
            store,
            hasher,
            decoy_hash,
        })
    }

    /// Outer error: the store failed. Inner error: the token is refused.
    pub async fn verify(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Res<Result<ApiKey, RejectReason>> {
        let Some(token) = KeyToken::parse(token) else {
            return Ok(Err(RejectReason::MalformedCredential));
        };

        let record = self.store.get_key_by_prefix(token.prefix).await?;
        let hash = match &record {
            Some(key) => key.secret_hash.clone(),
            None => self.decoy_hash.clone(),
        };
        let secret_matches = self.check_secret(token.secret, hash).await?;

        let Some(key) = record else {
            return Ok(Err(RejectReason::UnknownKey));
        };
        if !secret_matches {
            return Ok(Err(RejectReason::InvalidSecret));
        }
        if !key.is_usable_at(now) {
            return Ok(Err(RejectReason::KeyInactive));
        }

        Ok(Ok(key))
    }

    async fn check_secret(&self, secret: &str, hash: String) -> Res<bool> {
        let hasher = self.hasher.clone();
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::key::{issue_key, revoke_key};
    use chrono::Duration;
    use db::{MemoryStore, dtos::user::UserCreateRequest, models::user::Role};

    struct Fixture {
        store: Arc<MemoryStore>,
        verifier: CredentialVerifier,
        user_id: uuid::Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let hasher = SecretHasher::new(8, 1, 1).unwrap();
        let user = store
            .insert_user(UserCreateRequest {
                email: "verify@example.com".to_string(),
                role: Role::Client,
            })
            .await
            .unwrap();
        let verifier = CredentialVerifier::new(store.clone(), hasher).unwrap();
        Fixture {
            store,
            verifier,
            user_id: user.id,
        }
    }

    async fn issue(f: &Fixture, expires_at: Option<DateTime<Utc>>) -> crate::IssuedKey {
        let hasher = SecretHasher::new(8, 1, 1).unwrap();
        issue_key(&*f.store, &hasher, f.user_id, "ci".into(), vec![], expires_at)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn shape_is_checked_first() {
        let f = fixture().await;
        for token in ["", "nodot", "a.b.c", ".secret", "prefix.", "pre fix.secret"] {
            assert_eq!(
                f.verifier.verify(token, Utc::now()).await.unwrap().unwrap_err(),
                RejectReason::MalformedCredential,
                "token {:?}",
                token
            );
        }
    }

    #[tokio::test]
    async fn unknown_prefix_and_wrong_secret_look_alike() {
        let f = fixture().await;
        let issued = issue(&f, None).await;

        let unknown = f
            .verifier
            .verify("deadbeef.0123456789abcdef", Utc::now())
            .await
            .unwrap()
            .unwrap_err();
        let wrong = f
            .verifier
            .verify(&format!("{}.0123456789abcdef", issued.prefix), Utc::now())
            .await
            .unwrap()
            .unwrap_err();

        assert_eq!(unknown, RejectReason::UnknownKey);
        assert_eq!(wrong, RejectReason::InvalidSecret);
        assert_eq!(unknown.code(), wrong.code());
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn verification_is_repeatable() {
        let f = fixture().await;
        let issued = issue(&f, None).await;
        let now = Utc::now();

        let first = f.verifier.verify(&issued.key, now).await.unwrap().unwrap();
        let second = f.verifier.verify(&issued.key, now).await.unwrap().unwrap();
        assert_eq!(first.id, issued.id);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn revoked_and_expired_keys_are_inactive() {
        let f = fixture().await;
        let revoked = issue(&f, None).await;
        revoke_key(&*f.store, revoked.id, None).await.unwrap();

        let expiring = issue(&f, Some(Utc::now() + Duration::hours(1))).await;
        let later = Utc::now() + Duration::hours(2);

        assert_eq!(
            f.verifier.verify(&revoked.key, Utc::now()).await.unwrap().unwrap_err(),
            RejectReason::KeyInactive
        );
        assert_eq!(
            f.verifier.verify(&expiring.key, later).await.unwrap().unwrap_err(),
            RejectReason::KeyInactive
        );
        assert!(f.verifier.verify(&expiring.key, Utc::now()).await.unwrap().is_ok());
    }
}
