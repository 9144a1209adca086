use axum::response::{IntoResponse, Response};

use crate::db::StoreError;
use crate::error::ApiError;

/// Error types for appointment operations
#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Referenced account exists but is not a doctor
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<validator::ValidationErrors> for AppointmentError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppointmentError::ValidationError(errors.to_string())
    }
}

impl From<AppointmentError> for ApiError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::ValidationError(msg) => ApiError::validation(msg),
            AppointmentError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            AppointmentError::InvalidRole(msg) => ApiError::InvalidRole(msg),
            AppointmentError::InvalidTransition(msg) => ApiError::validation(msg),
            AppointmentError::Forbidden(msg) => ApiError::Forbidden(msg),
            AppointmentError::Store(err) => err.into(),
        }
    }
}

impl IntoResponse for AppointmentError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let status = |e: AppointmentError| ApiError::from(e).status_code();
        assert_eq!(status(AppointmentError::ValidationError("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(AppointmentError::NotFound("Appointment".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(AppointmentError::InvalidRole("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(AppointmentError::InvalidTransition("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(AppointmentError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status(AppointmentError::Store(StoreError::Corrupt("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
