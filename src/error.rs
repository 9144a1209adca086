// Error handling module for the Hospital API
// Every module error converts into ApiError, which is the only place
// that turns a failure into the response envelope.

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

/// Main error type for the API
///
/// Each variant maps to a specific HTTP status code and error code.
/// Module errors (`AuthError`, `AppointmentError`, ...) are converted into
/// this type before being rendered.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed input
    /// Maps to HTTP 400 Bad Request
    ValidationError {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Referenced account exists but has the wrong role
    /// Maps to HTTP 400 Bad Request
    InvalidRole(String),

    /// Referenced entity absent, or a query without results
    /// Maps to HTTP 404 Not Found
    NotFound(String),

    /// No principal could be established for the request
    /// Maps to HTTP 401 Unauthorized
    Unauthorized(String),

    /// Token is malformed, expired, or signed with another secret
    /// Maps to HTTP 401 Unauthorized
    InvalidToken,

    /// Well-formed refresh token that is no longer the stored one
    /// Maps to HTTP 401 Unauthorized
    TokenMismatch,

    /// Principal lacks the role required by the route
    /// Maps to HTTP 403 Forbidden
    Forbidden(String),

    /// Caller exceeded the request ceiling for the current window
    /// Maps to HTTP 429 Too Many Requests
    RateLimited,

    /// Unexpected failures (storage, hashing, signing)
    /// Maps to HTTP 500 Internal Server Error
    /// Details are logged, never sent to the client
    InternalError(String),
}

/// Failure envelope shared by all error responses
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub success: bool,
    pub message: String,

    /// Field-level details, omitted when there are none
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub errors: Option<serde_json::Value>,

    /// Machine-readable error code (e.g. "VALIDATION_ERROR")
    #[serde(rename = "error_code")]
    pub error_code: String,

    /// RFC 3339 timestamp of when the error occurred
    pub timestamp: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = self.to_error_response();
        (status, Json(error_response)).into_response()
    }
}

impl ApiError {
    /// Shorthand for a validation failure without field details
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            details: None,
        }
    }

    /// Convert to HTTP status code and envelope
    ///
    /// - error!: internal failures (500)
    /// - warn!: authentication and authorization failures, rate limiting
    /// - debug!: expected client errors (validation, not found)
    fn to_error_response(&self) -> (StatusCode, ErrorResponse) {
        let status = self.status_code();
        let (error_code, message, errors) = match self {
            ApiError::ValidationError { message, details } => {
                debug!("Validation error: {} {:?}", message, details);
                ("VALIDATION_ERROR", message.clone(), details.clone())
            }
            ApiError::InvalidRole(message) => {
                debug!("Invalid role: {}", message);
                ("INVALID_ROLE", message.clone(), None)
            }
            ApiError::NotFound(message) => {
                debug!("Not found: {}", message);
                ("NOT_FOUND", message.clone(), None)
            }
            ApiError::Unauthorized(message) => {
                warn!("Unauthorized request: {}", message);
                ("UNAUTHORIZED", message.clone(), None)
            }
            ApiError::InvalidToken => {
                warn!("Invalid token presented");
                ("INVALID_TOKEN", "Invalid or expired token".to_string(), None)
            }
            ApiError::TokenMismatch => {
                warn!("Superseded refresh token presented");
                (
                    "TOKEN_MISMATCH",
                    "Refresh token expired or already used".to_string(),
                    None,
                )
            }
            ApiError::Forbidden(message) => {
                warn!("Forbidden request: {}", message);
                ("FORBIDDEN", message.clone(), None)
            }
            ApiError::RateLimited => {
                warn!("Rate limit exceeded");
                (
                    "RATE_LIMITED",
                    "Too many requests. Please try again later.".to_string(),
                    None,
                )
            }
            ApiError::InternalError(internal_msg) => {
                error!("Internal error: {}", internal_msg);
                (
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        };

        (
            status,
            ErrorResponse {
                status_code: status.as_u16(),
                success: false,
                message,
                errors,
                error_code: error_code.to_string(),
                timestamp: Utc::now().to_rfc3339(),
            },
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            ApiError::InvalidRole(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::TokenMismatch => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert validator errors to ApiError
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError {
            message: "Request validation failed".to_string(),
            details: Some(serde_json::to_value(&errors).unwrap_or(serde_json::json!({}))),
        }
    }
}

/// Malformed or incomplete JSON bodies are validation failures
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

/// JSON body extractor whose rejection is rendered through `ApiError`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);
