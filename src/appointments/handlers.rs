// HTTP handlers for appointment endpoints

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use uuid::Uuid;

use crate::appointments::{
    error::AppointmentError,
    models::{
        Appointment, AppointmentQuery, CreateAppointmentRequest, FollowUpRequest,
        FollowUpResponse, RescheduleRequest, UpdateAppointmentRequest,
    },
};
use crate::auth::{
    middleware::require_auth,
    models::{AccountKind, Principal},
};
use crate::error::{ErrorResponse, JsonBody};
use crate::response::ApiResponse;
use crate::AppState;

/// Routes mounted under `/api/v1/appointment`; every one needs a principal
pub fn appointment_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/add-appointment", post(create_appointment))
        .route("/get-appointment", get(get_appointments))
        .route("/update-appointment/:id", put(update_appointment))
        .route("/cancel-appointment/:id", delete(cancel_appointment))
        .route("/reschedule-appointment/:id", put(reschedule_appointment))
        .route("/follow-up/:id", post(add_follow_up))
        .route_layer(from_fn_with_state(state, require_auth))
}

/// Handler for POST /api/v1/appointment/add-appointment
/// Books an appointment for the calling patient
#[utoipa::path(
    post,
    path = "/api/v1/appointment/add-appointment",
    request_body = CreateAppointmentRequest,
    responses(
        (status = 200, description = "Appointment created", body = Appointment),
        (status = 400, description = "Missing field, past date or referenced account is not a doctor", body = ErrorResponse),
        (status = 401, description = "No valid access token", body = ErrorResponse),
        (status = 403, description = "Caller is not a patient", body = ErrorResponse),
        (status = 404, description = "Doctor not found", body = ErrorResponse)
    ),
    tag = "appointments"
)]
pub async fn create_appointment(
    State(state): State<AppState>,
    principal: Principal,
    JsonBody(request): JsonBody<CreateAppointmentRequest>,
) -> Result<ApiResponse<Appointment>, AppointmentError> {
    if principal.kind() != AccountKind::Patient {
        tracing::warn!(
            "Non-patient {} ({}) attempted to book an appointment",
            principal.id,
            principal.role
        );
        return Err(AppointmentError::Forbidden(
            "Only patients can book appointments".to_string(),
        ));
    }

    let appointment = state.appointments.create(principal.id, request).await?;
    Ok(ApiResponse::ok(appointment, "Appointment created successfully"))
}

/// Handler for GET /api/v1/appointment/get-appointment
/// Lists appointments matching the optional filters
#[utoipa::path(
    get,
    path = "/api/v1/appointment/get-appointment",
    params(AppointmentQuery),
    responses(
        (status = 200, description = "Matching appointments ordered by date", body = Vec<Appointment>),
        (status = 400, description = "Malformed filter", body = ErrorResponse),
        (status = 401, description = "No valid access token", body = ErrorResponse),
        (status = 404, description = "No appointment matches", body = ErrorResponse)
    ),
    tag = "appointments"
)]
pub async fn get_appointments(
    State(state): State<AppState>,
    _principal: Principal,
    query: Result<Query<AppointmentQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<Appointment>>, AppointmentError> {
    let Query(query) =
        query.map_err(|rejection| AppointmentError::ValidationError(rejection.body_text()))?;
    tracing::debug!("Querying appointments: {:?}", query);

    let appointments = state.appointments.query(query).await?;
    Ok(ApiResponse::ok(appointments, "Appointments fetched successfully"))
}

/// Handler for PUT /api/v1/appointment/update-appointment/:id
#[utoipa::path(
    put,
    path = "/api/v1/appointment/update-appointment/{id}",
    params(
        ("id" = Uuid, Path, description = "Appointment ID")
    ),
    request_body = UpdateAppointmentRequest,
    responses(
        (status = 200, description = "Appointment updated", body = Appointment),
        (status = 400, description = "Invalid field, past date or disallowed status change", body = ErrorResponse),
        (status = 401, description = "No valid access token", body = ErrorResponse),
        (status = 404, description = "Appointment or doctor not found", body = ErrorResponse)
    ),
    tag = "appointments"
)]
pub async fn update_appointment(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdateAppointmentRequest>,
) -> Result<ApiResponse<Appointment>, AppointmentError> {
    let appointment = state.appointments.update(id, request).await?;
    Ok(ApiResponse::ok(appointment, "Appointment updated successfully"))
}

/// Handler for DELETE /api/v1/appointment/cancel-appointment/:id
/// The record is kept with status cancelled
#[utoipa::path(
    delete,
    path = "/api/v1/appointment/cancel-appointment/{id}",
    params(
        ("id" = Uuid, Path, description = "Appointment ID")
    ),
    responses(
        (status = 200, description = "Appointment cancelled", body = Appointment),
        (status = 401, description = "No valid access token", body = ErrorResponse),
        (status = 404, description = "Appointment not found", body = ErrorResponse)
    ),
    tag = "appointments"
)]
pub async fn cancel_appointment(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Appointment>, AppointmentError> {
    let appointment = state.appointments.cancel(id).await?;
    Ok(ApiResponse::ok(appointment, "Appointment cancelled successfully"))
}

/// Handler for PUT /api/v1/appointment/reschedule-appointment/:id
#[utoipa::path(
    put,
    path = "/api/v1/appointment/reschedule-appointment/{id}",
    params(
        ("id" = Uuid, Path, description = "Appointment ID")
    ),
    request_body = RescheduleRequest,
    responses(
        (status = 200, description = "Appointment rescheduled", body = Appointment),
        (status = 400, description = "Missing or past date", body = ErrorResponse),
        (status = 401, description = "No valid access token", body = ErrorResponse),
        (status = 404, description = "Appointment not found", body = ErrorResponse)
    ),
    tag = "appointments"
)]
pub async fn reschedule_appointment(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<RescheduleRequest>,
) -> Result<ApiResponse<Appointment>, AppointmentError> {
    let appointment = state.appointments.reschedule(id, request).await?;
    Ok(ApiResponse::ok(appointment, "Appointment rescheduled successfully"))
}

/// Handler for POST /api/v1/appointment/follow-up/:id
/// Creates a follow-up for the same patient and doctor
#[utoipa::path(
    post,
    path = "/api/v1/appointment/follow-up/{id}",
    params(
        ("id" = Uuid, Path, description = "Parent appointment ID")
    ),
    request_body = FollowUpRequest,
    responses(
        (status = 201, description = "Follow-up created and linked", body = FollowUpResponse),
        (status = 400, description = "Missing field or past date", body = ErrorResponse),
        (status = 401, description = "No valid access token", body = ErrorResponse),
        (status = 404, description = "Parent appointment not found", body = ErrorResponse)
    ),
    tag = "appointments"
)]
pub async fn add_follow_up(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<FollowUpRequest>,
) -> Result<ApiResponse<FollowUpResponse>, AppointmentError> {
    let created = state.appointments.add_follow_up(id, request).await?;
    Ok(ApiResponse::created(created, "Follow-up appointment created successfully"))
}
