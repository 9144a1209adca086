use axum::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::appointments::models::{Appointment, AppointmentQuery, AppointmentStatus, Location};
use crate::db::StoreError;

/// Column-level changes to one appointment. Absent fields keep whatever is
/// stored at write time, so a concurrent follow-up link is never overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentChanges {
    pub doctor_id: Option<Uuid>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    pub reason: Option<String>,
    pub location: Option<Location>,
    pub follow_up: Option<Vec<Uuid>>,
    pub notes: Option<String>,
    /// The change only applies while the stored status still equals this
    pub expected_status: Option<AppointmentStatus>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentChanges {
    pub fn at(updated_at: DateTime<Utc>) -> Self {
        Self {
            doctor_id: None,
            appointment_date: None,
            status: None,
            reason: None,
            location: None,
            follow_up: None,
            notes: None,
            expected_status: None,
            updated_at,
        }
    }

    fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(doctor_id) = self.doctor_id {
            appointment.doctor_id = doctor_id;
        }
        if let Some(date) = self.appointment_date {
            appointment.appointment_date = date;
        }
        if let Some(status) = self.status {
            appointment.status = status;
        }
        if let Some(reason) = &self.reason {
            appointment.reason = reason.clone();
        }
        if let Some(location) = self.location {
            appointment.location = location;
        }
        if let Some(follow_up) = &self.follow_up {
            appointment.follow_up = follow_up.clone();
        }
        if let Some(notes) = &self.notes {
            appointment.notes = Some(notes.clone());
        }
        appointment.updated_at = self.updated_at;
    }
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn insert(&self, appointment: &Appointment) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Appointments matching every present filter, ordered by date
    async fn find(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StoreError>;

    /// Write only the present fields and return the stored result. `None` when the
    /// appointment is gone or no longer has the expected status.
    async fn apply(
        &self,
        id: Uuid,
        changes: &AppointmentChanges,
    ) -> Result<Option<Appointment>, StoreError>;

    /// Insert `child` and append its id to the parent's follow-up list as one unit.
    /// Returns the updated parent, or `None` (and nothing written) if the parent is gone.
    async fn insert_follow_up(
        &self,
        parent_id: Uuid,
        child: &Appointment,
    ) -> Result<Option<Appointment>, StoreError>;
}

const APPOINTMENT_COLUMNS: &str = "id, patient_id, doctor_id, appointment_date, status, reason, \
     location, follow_up, notes, created_at, updated_at";

/// PostgreSQL appointment repository
#[derive(Clone)]
pub struct PgAppointmentRepository {
    pool: PgPool,
}

impl PgAppointmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AppointmentRepository for PgAppointmentRepository {
    async fn insert(&self, appointment: &Appointment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO appointments (id, patient_id, doctor_id, appointment_date, status,
                                      reason, location, follow_up, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(appointment.id)
        .bind(appointment.patient_id)
        .bind(appointment.doctor_id)
        .bind(appointment.appointment_date)
        .bind(appointment.status)
        .bind(&appointment.reason)
        .bind(appointment.location)
        .bind(&appointment.follow_up)
        .bind(appointment.notes.as_deref())
        .bind(appointment.created_at)
        .bind(appointment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let sql = format!("SELECT {} FROM appointments WHERE id = $1", APPOINTMENT_COLUMNS);
        let appointment = sqlx::query_as::<_, Appointment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(appointment)
    }

    async fn find(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StoreError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM appointments
            WHERE ($1::uuid IS NULL OR doctor_id = $1)
              AND ($2::uuid IS NULL OR patient_id = $2)
              AND ($3::text IS NULL OR status = $3)
              AND ($4::timestamptz IS NULL OR appointment_date >= $4)
              AND ($5::timestamptz IS NULL OR appointment_date <= $5)
            ORDER BY appointment_date
            "#,
            APPOINTMENT_COLUMNS
        );
        let appointments = sqlx::query_as::<_, Appointment>(&sql)
            .bind(query.doctor_id)
            .bind(query.patient_id)
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.start_date)
            .bind(query.end_date)
            .fetch_all(&self.pool)
            .await?;

        Ok(appointments)
    }

    async fn apply(
        &self,
        id: Uuid,
        changes: &AppointmentChanges,
    ) -> Result<Option<Appointment>, StoreError> {
        let sql = format!(
            r#"
            UPDATE appointments
            SET doctor_id = COALESCE($1, doctor_id),
                appointment_date = COALESCE($2, appointment_date),
                status = COALESCE($3, status),
                reason = COALESCE($4, reason),
                location = COALESCE($5, location),
                follow_up = COALESCE($6, follow_up),
                notes = COALESCE($7, notes),
                updated_at = $8
            WHERE id = $9
              AND ($10::text IS NULL OR status = $10)
            RETURNING {}
            "#,
            APPOINTMENT_COLUMNS
        );
        let appointment = sqlx::query_as::<_, Appointment>(&sql)
            .bind(changes.doctor_id)
            .bind(changes.appointment_date)
            .bind(changes.status.map(|s| s.as_str()))
            .bind(changes.reason.as_deref())
            .bind(changes.location.map(|l| l.as_str()))
            .bind(changes.follow_up.as_deref())
            .bind(changes.notes.as_deref())
            .bind(changes.updated_at)
            .bind(id)
            .bind(changes.expected_status.map(|s| s.as_str()))
            .fetch_optional(&self.pool)
            .await?;

        Ok(appointment)
    }

    async fn insert_follow_up(
        &self,
        parent_id: Uuid,
        child: &Appointment,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock the parent so concurrent follow-ups append in order
        let locked = format!(
            "SELECT {} FROM appointments WHERE id = $1 FOR UPDATE",
            APPOINTMENT_COLUMNS
        );
        let parent = sqlx::query_as::<_, Appointment>(&locked)
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await?;
        if parent.is_none() {
            // Transaction is rolled back when tx is dropped
            return Ok(None);
        }

        sqlx::query(
            r#"
            INSERT INTO appointments (id, patient_id, doctor_id, appointment_date, status,
                                      reason, location, follow_up, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(child.id)
        .bind(child.patient_id)
        .bind(child.doctor_id)
        .bind(child.appointment_date)
        .bind(child.status)
        .bind(&child.reason)
        .bind(child.location)
        .bind(&child.follow_up)
        .bind(child.notes.as_deref())
        .bind(child.created_at)
        .bind(child.updated_at)
        .execute(&mut *tx)
        .await?;

        let linked = format!(
            r#"
            UPDATE appointments
            SET follow_up = array_append(follow_up, $1),
                updated_at = $2
            WHERE id = $3
            RETURNING {}
            "#,
            APPOINTMENT_COLUMNS
        );
        let parent = sqlx::query_as::<_, Appointment>(&linked)
            .bind(child.id)
            .bind(child.created_at)
            .bind(parent_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(parent))
    }
}

/// In-memory appointment repository for development without a database and for tests
#[derive(Default)]
pub struct MemoryAppointmentRepository {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl MemoryAppointmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentRepository for MemoryAppointmentRepository {
    async fn insert(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut appointments = self.appointments.write().await;
        if appointments.contains_key(&appointment.id) {
            return Err(StoreError::Duplicate(format!(
                "appointment {}",
                appointment.id
            )));
        }
        appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn find(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StoreError> {
        let mut found: Vec<_> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        found.sort_by_key(|a| a.appointment_date);
        Ok(found)
    }

    async fn apply(
        &self,
        id: Uuid,
        changes: &AppointmentChanges,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut appointments = self.appointments.write().await;
        match appointments.get_mut(&id) {
            Some(stored)
                if changes
                    .expected_status
                    .map_or(true, |expected| stored.status == expected) =>
            {
                changes.apply_to(stored);
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_follow_up(
        &self,
        parent_id: Uuid,
        child: &Appointment,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut appointments = self.appointments.write().await;
        if appointments.contains_key(&child.id) {
            return Err(StoreError::Duplicate(format!("appointment {}", child.id)));
        }

        let parent = match appointments.get_mut(&parent_id) {
            Some(parent) => {
                parent.follow_up.push(child.id);
                parent.updated_at = child.created_at;
                parent.clone()
            }
            None => return Ok(None),
        };
        appointments.insert(child.id, child.clone());
        Ok(Some(parent))
    }
}
