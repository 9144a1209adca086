use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::validation::validate_not_blank;

/// Appointment status; every change is an explicit operation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Completed,
    Cancelled,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rescheduled => "rescheduled",
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "rescheduled" => Ok(AppointmentStatus::Rescheduled),
            _ => Err(format!("Invalid appointment status: {}", s)),
        }
    }
}

impl Default for AppointmentStatus {
    fn default() -> Self {
        AppointmentStatus::Pending
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Online,
    Clinic,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Online => "online",
            Location::Clinic => "clinic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub reason: String,
    pub location: Location,
    /// Follow-up appointments spawned from this one, oldest first
    pub follow_up: Vec<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of POST /add-appointment. The patient is the caller.
/// Fields are optional on the wire so that missing ones surface as validation errors.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    pub appointment_date: Option<DateTime<Utc>>,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
    pub location: Option<Location>,
    pub follow_up: Option<Vec<Uuid>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Body of PUT /update-appointment/:id; only present fields change
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    pub appointment_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 1000), custom = "validate_not_blank")]
    pub reason: Option<String>,
    pub location: Option<Location>,
    pub status: Option<AppointmentStatus>,
    pub follow_up: Option<Vec<Uuid>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Body of PUT /reschedule-appointment/:id
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RescheduleRequest {
    pub new_appointment_date: Option<DateTime<Utc>>,
}

/// Body of POST /follow-up/:id; patient and doctor come from the parent
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct FollowUpRequest {
    pub appointment_date: Option<DateTime<Utc>>,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
    pub location: Option<Location>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Result of POST /follow-up/:id
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FollowUpResponse {
    pub follow_up: Appointment,
    pub parent: Appointment,
}

/// Filters for GET /get-appointment; all optional, date bounds inclusive
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AppointmentQuery {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl AppointmentQuery {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.status.map_or(true, |s| appointment.status == s)
            && self
                .start_date
                .map_or(true, |start| appointment.appointment_date >= start)
            && self
                .end_date
                .map_or(true, |end| appointment.appointment_date <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn appointment() -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            appointment_date: now + Duration::days(3),
            status: AppointmentStatus::Pending,
            reason: "checkup".to_string(),
            location: Location::Clinic,
            follow_up: vec![],
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("Cancelled".parse::<AppointmentStatus>().unwrap(), AppointmentStatus::Cancelled);
        assert!("done".parse::<AppointmentStatus>().is_err());
        assert_eq!(AppointmentStatus::Rescheduled.to_string(), "rescheduled");
        assert_eq!(AppointmentStatus::default(), AppointmentStatus::Pending);
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(AppointmentQuery::default().matches(&appointment()));
    }

    #[test]
    fn test_query_filters_combine() {
        let a = appointment();
        let by_doctor = AppointmentQuery {
            doctor_id: Some(a.doctor_id),
            status: Some(AppointmentStatus::Pending),
            ..Default::default()
        };
        let wrong_status = AppointmentQuery {
            doctor_id: Some(a.doctor_id),
            status: Some(AppointmentStatus::Cancelled),
            ..Default::default()
        };
        assert!(by_doctor.matches(&a));
        assert!(!wrong_status.matches(&a));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let a = appointment();
        let exact = AppointmentQuery {
            start_date: Some(a.appointment_date),
            end_date: Some(a.appointment_date),
            ..Default::default()
        };
        let before = AppointmentQuery {
            end_date: Some(a.appointment_date - Duration::seconds(1)),
            ..Default::default()
        };
        assert!(exact.matches(&a));
        assert!(!before.matches(&a));
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(appointment()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["location"], "clinic");
        assert!(json["follow_up"].as_array().unwrap().is_empty());
    }
}
