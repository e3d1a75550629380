use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier},
};
use rand::RngCore;

use crate::error::{AppError, Res};

pub const TOKEN_SEPARATOR: char = '.';

const PREFIX_BYTES: usize = 4;
const SECRET_BYTES: usize = 24;
const MAX_PREFIX_LEN: usize = 32;
const MAX_SECRET_LEN: usize = 128;

/// Raw `prefix.secret` value taken from the `X-API-KEY` header.
#[derive(Debug, Clone)]
pub struct ApiKeyHeader(pub String);

/// Borrowed view over a well-formed `prefix.secret` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyToken<'a> {
    pub prefix: &'a str,
    pub secret: &'a str,
}

impl<'a> KeyToken<'a> {
    /// Splits a raw token into its two halves.
    ///
    /// Returns `None` for anything that is not exactly two non-empty
    /// alphanumeric parts joined by a single separator.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let (prefix, secret) = raw.split_once(TOKEN_SEPARATOR)?;

        let well_formed = |part: &str, max: usize| {
            !part.is_empty() && part.len() <= max && part.bytes().all(|b| b.is_ascii_alphanumeric())
        };

        if !well_formed(prefix, MAX_PREFIX_LEN) || !well_formed(secret, MAX_SECRET_LEN) {
            return None;
        }

        Some(Self { prefix, secret })
    }
}

/// Freshly generated key material. The secret only ever lives here and in the
/// single response that hands it to the owner.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub prefix: String,
    pub secret: String,
}

impl GeneratedKey {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();

        let mut prefix = [0u8; PREFIX_BYTES];
        rng.fill_bytes(&mut prefix);
        let mut secret = [0u8; SECRET_BYTES];
        rng.fill_bytes(&mut secret);

        Self {
            prefix: hex::encode(prefix),
            secret: hex::encode(secret),
        }
    }

    pub fn token(&self) -> String {
        format!("{}{}{}", self.prefix, TOKEN_SEPARATOR, self.secret)
    }
}

/// Salted argon2 hashing for key secrets.
#[derive(Clone)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
}

impl Default for SecretHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl SecretHasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Res<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AppError::Internal(format!("Invalid argon2 parameters: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Produces a PHC string carrying its own salt and parameters.
    pub fn hash(&self, secret: &str) -> Res<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to hash key secret: {}", e)))
    }

    /// Constant-time check of `secret` against a stored PHC string.
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("Stored key hash could not be parsed: {}", e);
                return false;
            }
        };

        self.argon2
            .verify_password(secret.as_bytes(), &parsed_hash)
            .is_ok()
    }
}
