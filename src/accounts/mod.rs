// Account registry module
// Users, doctors and patients share credential and token handling;
// each kind keeps its own collection and required fields

pub mod handlers;
pub mod models;
pub mod repository;
pub mod service;

pub use handlers::{account_routes, AccountScope};
pub use models::{Account, AccountResponse, DoctorProfile, PatientProfile, Profile, UserProfile};
pub use repository::{AccountRepository, MemoryAccountRepository, PgAccountRepository};
pub use service::{AccountDirectory, AccountService};
