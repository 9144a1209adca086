// Authentication module
// Credential hashing, JWT access/refresh tokens and the access control gate

pub mod error;
pub mod middleware;
pub mod models;
pub mod password;
pub mod token;

// Re-export commonly used types
pub use error::AuthError;
pub use middleware::{require_admin, require_auth};
pub use models::{AccountKind, Principal, Role};
pub use password::{HashedPassword, PasswordService};
pub use token::{TokenConfig, TokenPair, TokenService};
