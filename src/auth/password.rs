// Password hashing and verification (credential store)

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::fmt;

use crate::auth::error::AuthError;

const MIN_PASSWORD_LENGTH: usize = 8;

/// An Argon2id PHC string.
///
/// Only constructible by hashing a plaintext or by loading an already stored
/// hash, so a hash can never be hashed a second time.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword(String);

impl HashedPassword {
    /// Hash a new plaintext password
    pub fn from_plaintext(plaintext: &str) -> Result<Self, AuthError> {
        PasswordService::hash_password(plaintext).map(HashedPassword)
    }

    /// Wrap a hash read back from storage
    pub fn from_stored(hash: String) -> Self {
        HashedPassword(hash)
    }

    pub fn verify(&self, plaintext: &str) -> bool {
        PasswordService::verify_password(plaintext, &self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedPassword(<redacted>)")
    }
}

/// Password service for hashing and verification
pub struct PasswordService;

impl PasswordService {
    /// Hash a password using Argon2id with a random salt
    pub fn hash_password(password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| AuthError::PasswordHashError)
    }

    /// Verify a password against a hash. A malformed hash never verifies.
    pub fn verify_password(password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => {
                tracing::error!("Stored password hash is not a valid PHC string");
                false
            }
        }
    }

    /// Validate password strength requirements
    pub fn validate_password_strength(password: &str) -> Result<(), AuthError> {
        if password.trim().is_empty() {
            return Err(AuthError::ValidationError("Password is required".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::ValidationError(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }
}
