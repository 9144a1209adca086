// Appointment lifecycle module
// Booking, filtered queries, status changes, rescheduling and follow-ups

pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod service;
pub mod status_machine;

pub use error::AppointmentError;
pub use handlers::appointment_routes;
pub use models::{Appointment, AppointmentQuery, AppointmentStatus, Location};
pub use repository::{AppointmentRepository, MemoryAppointmentRepository, PgAppointmentRepository};
pub use service::AppointmentService;
pub use status_machine::StatusMachine;
