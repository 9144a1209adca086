// Roles, account kinds and the request principal

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Access-level tag on an account, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    SuperAdmin,
    Staff,
    Doctor,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
            Role::Staff => "staff",
            Role::Doctor => "doctor",
            Role::Patient => "patient",
        }
    }

    /// Collection an account with this role is stored in
    pub fn account_kind(&self) -> AccountKind {
        match self {
            Role::Admin | Role::SuperAdmin | Role::Staff => AccountKind::User,
            Role::Doctor => AccountKind::Doctor,
            Role::Patient => AccountKind::Patient,
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            "staff" => Ok(Role::Staff),
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The three stored account collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    User,
    Doctor,
    Patient,
}

impl AccountKind {
    pub fn table(&self) -> &'static str {
        match self {
            AccountKind::User => "users",
            AccountKind::Doctor => "doctors",
            AccountKind::Patient => "patients",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccountKind::User => "User",
            AccountKind::Doctor => "Doctor",
            AccountKind::Patient => "Patient",
        }
    }
}

/// Account attached to a request after successful token verification.
/// `account` is the public view: password hash and refresh token are stripped.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub display_name: String,
    pub account: serde_json::Value,
}

impl Principal {
    pub fn kind(&self) -> AccountKind {
        self.role.account_kind()
    }
}
