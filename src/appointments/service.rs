use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::accounts::AccountDirectory;
use crate::appointments::{
    error::AppointmentError,
    models::{
        Appointment, AppointmentQuery, AppointmentStatus, CreateAppointmentRequest,
        FollowUpRequest, FollowUpResponse, Location, RescheduleRequest, UpdateAppointmentRequest,
    },
    repository::{AppointmentChanges, AppointmentRepository},
    status_machine::StatusMachine,
};
use crate::auth::models::AccountKind;
use crate::validation::is_in_future;

/// Appointment lifecycle: creation, queries, updates, cancel, reschedule, follow-ups
pub struct AppointmentService {
    repo: Arc<dyn AppointmentRepository>,
    accounts: AccountDirectory,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, AppointmentError> {
    value.ok_or_else(|| AppointmentError::ValidationError(format!("{} is required", field)))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, AppointmentError> {
    let text = required(value, field)?.trim().to_string();
    if text.is_empty() {
        return Err(AppointmentError::ValidationError(format!(
            "{} is required",
            field
        )));
    }
    Ok(text)
}

fn ensure_future(date: &DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AppointmentError> {
    if !is_in_future(date, now) {
        return Err(AppointmentError::ValidationError(
            "Appointment date must be in the future".to_string(),
        ));
    }
    Ok(())
}

impl AppointmentService {
    pub fn new(repo: Arc<dyn AppointmentRepository>, accounts: AccountDirectory) -> Self {
        Self { repo, accounts }
    }

    /// The referenced account must exist and be a doctor
    async fn ensure_doctor(&self, doctor_id: Uuid) -> Result<(), AppointmentError> {
        match self.accounts.kind_of(doctor_id).await? {
            Some(AccountKind::Doctor) => Ok(()),
            Some(kind) => {
                warn!(
                    "Appointment references non-doctor account: id={}, kind={}",
                    doctor_id,
                    kind.label()
                );
                Err(AppointmentError::InvalidRole(format!(
                    "Account {} is not a doctor",
                    doctor_id
                )))
            }
            None => Err(AppointmentError::NotFound("Doctor".to_string())),
        }
    }

    async fn apply(
        &self,
        id: Uuid,
        changes: AppointmentChanges,
    ) -> Result<Appointment, AppointmentError> {
        if let Some(appointment) = self.repo.apply(id, &changes).await? {
            return Ok(appointment);
        }
        match changes.expected_status {
            Some(expected) if self.repo.find_by_id(id).await?.is_some() => {
                Err(AppointmentError::InvalidTransition(format!(
                    "Appointment is no longer {}",
                    expected
                )))
            }
            _ => Err(AppointmentError::NotFound("Appointment".to_string())),
        }
    }

    /// Book an appointment for `patient_id` with a doctor at a future date
    pub async fn create(
        &self,
        patient_id: Uuid,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        request.validate()?;
        let doctor_id = required(request.doctor_id, "doctor_id")?;
        let appointment_date = required(request.appointment_date, "appointment_date")?;
        let reason = required_text(request.reason, "reason")?;
        let location: Location = required(request.location, "location")?;

        let now = Utc::now();
        ensure_future(&appointment_date, now)?;
        self.ensure_doctor(doctor_id).await?;

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            appointment_date,
            status: AppointmentStatus::Pending,
            reason,
            location,
            follow_up: request.follow_up.unwrap_or_default(),
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert(&appointment).await?;

        info!(
            "Appointment created: id={}, patient_id={}, doctor_id={}",
            appointment.id, patient_id, doctor_id
        );
        Ok(appointment)
    }

    /// Appointments matching the filters. No match is reported as not found.
    pub async fn query(&self, query: AppointmentQuery) -> Result<Vec<Appointment>, AppointmentError> {
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if start > end {
                return Err(AppointmentError::ValidationError(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }

        let appointments = self.repo.find(&query).await?;
        if appointments.is_empty() {
            debug!("No appointments match {:?}", query);
            return Err(AppointmentError::NotFound("Appointments".to_string()));
        }
        Ok(appointments)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound("Appointment".to_string()))
    }

    /// Apply each present field, re-validating doctor, date and status changes
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        request.validate()?;
        let current = self.find_by_id(id).await?;
        let now = Utc::now();
        let mut changes = AppointmentChanges::at(now);

        if let Some(doctor_id) = request.doctor_id {
            self.ensure_doctor(doctor_id).await?;
            changes.doctor_id = Some(doctor_id);
        }
        if let Some(date) = request.appointment_date {
            ensure_future(&date, now)?;
            changes.appointment_date = Some(date);
        }
        if let Some(status) = request.status {
            let next = StatusMachine::transition(current.status, status)
                .map_err(AppointmentError::InvalidTransition)?;
            changes.status = Some(next);
            changes.expected_status = Some(current.status);
        }
        changes.reason = request.reason;
        changes.location = request.location;
        changes.follow_up = request.follow_up;
        changes.notes = request.notes;

        let appointment = self.apply(id, changes).await?;
        info!("Appointment updated: id={}", id);
        Ok(appointment)
    }

    /// Force the status to cancelled. Repeating it is harmless.
    pub async fn cancel(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        let mut changes = AppointmentChanges::at(Utc::now());
        changes.status = Some(AppointmentStatus::Cancelled);

        let appointment = self.apply(id, changes).await?;
        info!("Appointment cancelled: id={}", id);
        Ok(appointment)
    }

    /// Move the appointment to a new future date and mark it rescheduled
    pub async fn reschedule(
        &self,
        id: Uuid,
        request: RescheduleRequest,
    ) -> Result<Appointment, AppointmentError> {
        let new_date = required(request.new_appointment_date, "new_appointment_date")?;
        self.find_by_id(id).await?;

        let now = Utc::now();
        ensure_future(&new_date, now)?;
        let mut changes = AppointmentChanges::at(now);
        changes.appointment_date = Some(new_date);
        changes.status = Some(AppointmentStatus::Rescheduled);

        let appointment = self.apply(id, changes).await?;
        info!("Appointment rescheduled: id={}, date={}", id, new_date);
        Ok(appointment)
    }

    /// Spawn a follow-up sharing the parent's patient and doctor and link it
    /// from the parent in one storage operation
    pub async fn add_follow_up(
        &self,
        parent_id: Uuid,
        request: FollowUpRequest,
    ) -> Result<FollowUpResponse, AppointmentError> {
        let parent = self.find_by_id(parent_id).await?;

        request.validate()?;
        let appointment_date = required(request.appointment_date, "appointment_date")?;
        let reason = required_text(request.reason, "reason")?;
        let location = required(request.location, "location")?;

        let now = Utc::now();
        ensure_future(&appointment_date, now)?;

        let child = Appointment {
            id: Uuid::new_v4(),
            patient_id: parent.patient_id,
            doctor_id: parent.doctor_id,
            appointment_date,
            status: AppointmentStatus::Pending,
            reason,
            location,
            follow_up: Vec::new(),
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };

        let parent = self
            .repo
            .insert_follow_up(parent_id, &child)
            .await?
            .ok_or_else(|| AppointmentError::NotFound("Appointment".to_string()))?;

        info!(
            "Follow-up created: id={}, parent_id={}",
            child.id, parent_id
        );
        Ok(FollowUpResponse {
            follow_up: child,
            parent,
        })
    }
}
