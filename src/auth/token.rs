// JWT token generation and validation service

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::{error::AuthError, models::Role};

/// Access token claims: identity, role and display name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub username: String,
    /// Kept as a string so an unrecognized role surfaces at the gate, not at decode
    pub role: String,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

/// Refresh token claims: only the account id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    /// Random per token, two tokens minted in the same second still differ
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// What an access token is minted from
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Secrets and lifetimes for both token kinds
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_secret: String,
    pub refresh_ttl_secs: i64,
}

/// Token service for JWT operations
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    /// Generate an access token carrying {id, username, role, name}
    pub fn issue_access_token(&self, subject: &TokenSubject) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: subject.id,
            username: subject.username.clone(),
            role: subject.role.as_str().to_string(),
            name: subject.name.clone(),
            iat: now,
            exp: now + self.access_ttl_secs,
        };

        encode(&Header::default(), &claims, &self.access_encoding)
            .map_err(|e| AuthError::TokenGenerationError(e.to_string()))
    }

    /// Generate a refresh token carrying only the account id
    pub fn issue_refresh_token(&self, account_id: Uuid) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: account_id,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + self.refresh_ttl_secs,
        };

        encode(&Header::default(), &claims, &self.refresh_encoding)
            .map_err(|e| AuthError::TokenGenerationError(e.to_string()))
    }

    /// Generate both tokens. Nothing is persisted here.
    pub fn issue_pair(&self, subject: &TokenSubject) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(subject)?,
            refresh_token: self.issue_refresh_token(subject.id)?,
        })
    }

    /// Validate an access token
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        decode::<AccessClaims>(token, &self.access_decoding, &Self::validation())
            .map(|data| data.claims)
            .map_err(Self::rejected)
    }

    /// Decode a refresh token without comparing it to the stored one
    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        decode::<RefreshClaims>(token, &self.refresh_decoding, &Self::validation())
            .map(|data| data.claims)
            .map_err(Self::rejected)
    }

    /// Validate a refresh token against the fingerprint stored on the account.
    /// A cleared (logged out) account has no stored fingerprint and rejects all tokens.
    pub fn verify_refresh(
        &self,
        token: &str,
        stored_fingerprint: Option<&str>,
    ) -> Result<RefreshClaims, AuthError> {
        let claims = self.decode_refresh(token)?;
        match stored_fingerprint {
            Some(stored) if stored == Self::fingerprint(token) => Ok(claims),
            _ => Err(AuthError::TokenMismatch),
        }
    }

    /// SHA-256 of a token, the form a refresh token is stored in
    pub fn fingerprint(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn validation() -> Validation {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation
    }

    fn rejected(error: jsonwebtoken::errors::Error) -> AuthError {
        match error.kind() {
            ErrorKind::ExpiredSignature => tracing::debug!("Token expired"),
            kind => tracing::debug!("Token rejected: {:?}", kind),
        }
        AuthError::InvalidToken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_config() -> TokenConfig {
        TokenConfig {
            access_secret: "test_access_secret_for_testing".to_string(),
            access_ttl_secs: 900,
            refresh_secret: "test_refresh_secret_for_testing".to_string(),
            refresh_ttl_secs: 604800,
        }
    }

    // Helper to create a test token service
    fn test_token_service() -> TokenService {
        TokenService::new(&test_config())
    }

    fn subject(role: Role) -> TokenSubject {
        TokenSubject {
            id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            role,
            name: "John Doe".to_string(),
        }
    }

    #[test]
    fn test_access_token_expiration_follows_config() {
        let service = test_token_service();
        let token = service.issue_access_token(&subject(Role::Patient)).unwrap();
        let claims = service.verify_access(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_refresh_token_expiration_follows_config() {
        let service = test_token_service();
        let token = service.issue_refresh_token(Uuid::new_v4()).unwrap();
        let claims = service.decode_refresh(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 604800);
    }

    #[test]
    fn test_access_claims_carry_identity() {
        let service = test_token_service();
        let subject = subject(Role::Doctor);
        let token = service.issue_access_token(&subject).unwrap();
        let claims = service.verify_access(&token).unwrap();

        assert_eq!(claims.sub, subject.id);
        assert_eq!(claims.username, "jdoe");
        assert_eq!(claims.role, "doctor");
        assert_eq!(claims.name, "John Doe");
    }

    #[test]
    fn test_access_and_refresh_secrets_are_separate() {
        let service = test_token_service();
        let subject = subject(Role::Admin);
        let pair = service.issue_pair(&subject).unwrap();

        assert!(service.verify_access(&pair.refresh_token).is_err());
        assert!(service.decode_refresh(&pair.access_token).is_err());
    }

    #[test]
    fn test_refresh_tokens_are_unique_within_a_second() {
        let service = test_token_service();
        let id = Uuid::new_v4();
        let a = service.issue_refresh_token(id).unwrap();
        let b = service.issue_refresh_token(id).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_refresh_accepts_stored_token() {
        let service = test_token_service();
        let token = service.issue_refresh_token(Uuid::new_v4()).unwrap();
        let stored = TokenService::fingerprint(&token);
        assert!(service.verify_refresh(&token, Some(&stored)).is_ok());
    }

    #[test]
    fn test_superseded_refresh_token_is_a_mismatch() {
        let service = test_token_service();
        let id = Uuid::new_v4();
        let old = service.issue_refresh_token(id).unwrap();
        let new = service.issue_refresh_token(id).unwrap();
        let stored = TokenService::fingerprint(&new);

        let result = service.verify_refresh(&old, Some(&stored));
        assert!(matches!(result, Err(AuthError::TokenMismatch)));
    }

    #[test]
    fn test_cleared_refresh_token_is_a_mismatch() {
        let service = test_token_service();
        let token = service.issue_refresh_token(Uuid::new_v4()).unwrap();
        let result = service.verify_refresh(&token, None);
        assert!(matches!(result, Err(AuthError::TokenMismatch)));
    }

    #[test]
    fn test_malformed_refresh_token_is_invalid_not_mismatch() {
        let service = test_token_service();
        let result = service.verify_refresh("garbage", Some("whatever"));
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expired_access_token_is_rejected() {
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            username: "jdoe".to_string(),
            role: "patient".to_string(),
            name: "John Doe".to_string(),
            iat: Utc::now().timestamp() - 1000,
            exp: Utc::now().timestamp() - 500,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(test_config().access_secret.as_bytes()),
        )
        .unwrap();

        let result = test_token_service().verify_access(&token);
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_malformed_tokens_are_rejected() {
        let service = test_token_service();
        assert!(service.verify_access("").is_err());
        assert!(service.verify_access("not.a.token").is_err());
        assert!(service
            .verify_access("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.invalid.signature")
            .is_err());
    }

    #[test]
    fn test_token_signature_verification() {
        let other = TokenService::new(&TokenConfig {
            access_secret: "another_secret".to_string(),
            ..test_config()
        });
        let token = test_token_service()
            .issue_access_token(&subject(Role::Staff))
            .unwrap();
        assert!(other.verify_access(&token).is_err());
    }

    #[test]
    fn test_fingerprint_is_stable_sha256_hex() {
        let a = TokenService::fingerprint("abc");
        assert_eq!(a, TokenService::fingerprint("abc"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, TokenService::fingerprint("abd"));
    }

    proptest! {
        #[test]
        fn prop_access_claims_round_trip(
            username in "[a-z]{3,12}",
            name in "[A-Z][a-z]{2,10} [A-Z][a-z]{2,10}"
        ) {
            let service = test_token_service();
            let subject = TokenSubject {
                id: Uuid::new_v4(),
                username: username.clone(),
                role: Role::Patient,
                name: name.clone(),
            };
            let token = service.issue_access_token(&subject)?;
            let claims = service.verify_access(&token)?;
            prop_assert_eq!(claims.sub, subject.id);
            prop_assert_eq!(claims.username, username);
            prop_assert_eq!(claims.name, name);
        }

        #[test]
        fn prop_random_strings_are_not_tokens(malformed in "[a-zA-Z0-9]{10,50}") {
            let service = test_token_service();
            prop_assert!(service.verify_access(&malformed).is_err());
            prop_assert!(service.decode_refresh(&malformed).is_err());
        }
    }
}
