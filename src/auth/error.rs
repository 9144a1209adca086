// Authentication and authorization error types

use axum::response::{IntoResponse, Response};

use crate::db::StoreError;
use crate::error::ApiError;

/// Authentication and authorization error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Unknown account or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No token in cookie or Authorization header
    #[error("Missing authentication token")]
    MissingToken,

    /// Expired, malformed, or wrongly signed token
    #[error("Invalid token")]
    InvalidToken,

    /// Refresh token does not match the one stored on the account
    #[error("Refresh token mismatch")]
    TokenMismatch,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Password hashing error")]
    PasswordHashError,

    #[error("Token generation error: {0}")]
    TokenGenerationError(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuthError::ValidationError(errors.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::ValidationError(msg) => ApiError::validation(msg),
            AuthError::InvalidCredentials => {
                ApiError::Unauthorized("Invalid credentials".to_string())
            }
            AuthError::MissingToken => ApiError::Unauthorized("Unauthorized request".to_string()),
            AuthError::InvalidToken => ApiError::InvalidToken,
            AuthError::TokenMismatch => ApiError::TokenMismatch,
            AuthError::Unauthorized(msg) => ApiError::Unauthorized(msg),
            AuthError::Forbidden(msg) => ApiError::Forbidden(msg),
            AuthError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            AuthError::PasswordHashError => {
                ApiError::InternalError("Password hashing error".to_string())
            }
            AuthError::TokenGenerationError(msg) => {
                ApiError::InternalError(format!("Token generation error: {}", msg))
            }
            AuthError::Store(err) => err.into(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
