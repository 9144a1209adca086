use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    error::AuthError,
    models::{AccountKind, Principal, Role},
    password::HashedPassword,
    token::TokenSubject,
};
use crate::db::StoreError;
use crate::validation::validate_phone_number;

/// Accounts untouched for this long are reported as inactive
const INACTIVE_AFTER_MONTHS: u32 = 60;

/// Kind-specific part of an account.
///
/// The three account kinds share identity, credential and token handling;
/// only their required fields differ, and those live behind this trait.
pub trait Profile:
    Serialize + DeserializeOwned + Validate + Clone + Debug + Send + Sync + 'static
{
    const KIND: AccountKind;

    /// Roles an account of this kind may carry. The first one is the default.
    const ROLES: &'static [Role];

    /// Name placed in access tokens
    fn display_name(&self) -> String;

    /// Pick the role for a new account, rejecting roles foreign to this kind
    fn resolve_role(requested: Option<Role>) -> Result<Role, AuthError> {
        match requested {
            Some(role) if Self::ROLES.contains(&role) => Ok(role),
            Some(role) => Err(AuthError::ValidationError(format!(
                "Role {} is not allowed for a {} account",
                role,
                Self::KIND.label().to_lowercase()
            ))),
            None if Self::ROLES.len() == 1 => Ok(Self::ROLES[0]),
            None => Err(AuthError::ValidationError("Role is required".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[serde(alias = "Male")]
    Male,
    #[serde(alias = "Female")]
    Female,
    #[serde(alias = "Other")]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

/// Administrative account (admin, super_admin, staff)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UserProfile {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub address: Address,
}

impl Profile for UserProfile {
    const KIND: AccountKind = AccountKind::User;
    const ROLES: &'static [Role] = &[Role::Admin, Role::SuperAdmin, Role::Staff];

    fn display_name(&self) -> String {
        self.full_name.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DoctorProfile {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub address: Address,
    #[validate(length(min = 1))]
    pub qualification: String,
    #[validate(length(min = 1))]
    pub specialization: String,
    #[validate(length(min = 1))]
    pub hospital_affiliation: String,
    #[validate(length(min = 1))]
    pub license_number: String,
    pub years_of_experience: Option<u32>,
    pub primary_clinic_address: Option<Address>,
    #[validate(custom = "validate_phone_number")]
    pub clinic_phone_number: Option<String>,
    #[validate(email)]
    pub clinic_email: Option<String>,
    #[serde(default)]
    pub consultation_fees: Decimal,
    pub notes: Option<String>,
}

impl Profile for DoctorProfile {
    const KIND: AccountKind = AccountKind::Doctor;
    const ROLES: &'static [Role] = &[Role::Doctor];

    fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PatientProfile {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub address: Address,
    pub blood_group: BloodGroup,
    #[validate(custom = "validate_phone_number")]
    pub alternate_phone_number: String,
    #[validate(email)]
    pub alternate_email: Option<String>,
    #[validate(length(min = 1))]
    pub emergency_contact_name: String,
    pub emergency_contact_relationship: Option<String>,
    #[validate(custom = "validate_phone_number")]
    pub emergency_contact_phone_number: String,
    #[validate(length(min = 1))]
    pub aadhar_card: String,
    #[validate(length(min = 1))]
    pub pan_card: String,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    #[serde(default)]
    pub past_surgeries: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub lab_results: Vec<String>,
    pub insurance_provider: Option<String>,
    pub policy_number: Option<String>,
    pub coverage_details: Option<String>,
    pub primary_care_physician: Option<String>,
    pub physician_contact_info: Option<String>,
    pub nurse_notes: Option<String>,
}

impl Profile for PatientProfile {
    const KIND: AccountKind = AccountKind::Patient;
    const ROLES: &'static [Role] = &[Role::Patient];

    fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Secret material shared by every account kind
#[derive(Debug, Clone)]
pub struct Credentials {
    pub password: HashedPassword,
    /// SHA-256 fingerprint of the last issued refresh token; `None` after logout
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(password: HashedPassword) -> Self {
        Self {
            password,
            refresh_token: None,
        }
    }

    pub fn verify_password(&self, plaintext: &str) -> bool {
        self.password.verify(plaintext)
    }
}

/// A stored account of one kind
#[derive(Debug, Clone)]
pub struct Account<P> {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub role: Role,
    pub profile_picture: Option<String>,
    pub credentials: Credentials,
    pub profile: P,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<P: Profile> Account<P> {
    /// Derived at read time, never written back
    pub fn is_inactive(&self, now: DateTime<Utc>) -> bool {
        match now.checked_sub_months(Months::new(INACTIVE_AFTER_MONTHS)) {
            Some(cutoff) => self.updated_at < cutoff,
            None => false,
        }
    }

    pub fn token_subject(&self) -> TokenSubject {
        TokenSubject {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
            name: self.profile.display_name(),
        }
    }

    /// Public view without password hash or refresh token
    pub fn to_response(&self) -> AccountResponse<P> {
        AccountResponse {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            phone_number: self.phone_number.clone(),
            role: self.role,
            profile_picture: self.profile_picture.clone(),
            profile: self.profile.clone(),
            is_inactive: self.is_inactive(Utc::now()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn to_principal(&self) -> Result<Principal, StoreError> {
        Ok(Principal {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
            display_name: self.profile.display_name(),
            account: serde_json::to_value(self.to_response())?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse<P> {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub role: Role,
    pub profile_picture: Option<String>,
    #[serde(flatten)]
    pub profile: P,
    pub is_inactive: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity and credential fields of a registration
#[derive(Debug, Deserialize, Validate)]
pub struct NewIdentity {
    #[validate(length(min = 3, max = 100, message = "Username must be 3 to 100 characters long"))]
    pub username: String,
    pub password: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(custom = "validate_phone_number")]
    pub phone_number: String,
    pub role: Option<Role>,
    /// Path of an already uploaded file
    pub profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest<P> {
    #[serde(flatten)]
    pub identity: NewIdentity,
    #[serde(flatten)]
    pub profile: P,
}

/// Login identifier: exactly one of email or phone number
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginIdentifier {
    Email(String),
    Phone(String),
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: String,
}

impl LoginRequest {
    pub fn identifier(&self) -> Result<LoginIdentifier, AuthError> {
        let email = self.email.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let phone = self
            .phone_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (email, phone) {
            (Some(email), None) => Ok(LoginIdentifier::Email(email.to_lowercase())),
            (None, Some(phone)) => Ok(LoginIdentifier::Phone(phone.to_string())),
            (Some(_), Some(_)) => Err(AuthError::ValidationError(
                "Provide either email or phone number, not both".to_string(),
            )),
            (None, None) => Err(AuthError::ValidationError(
                "Email or phone number is required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Partial account update. `profile` holds only the profile fields to change.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[validate(length(min = 3, max = 100))]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(custom = "validate_phone_number")]
    pub phone_number: Option<String>,
    pub password: Option<String>,
    pub profile_picture: Option<String>,
    pub profile: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse<P> {
    pub user: AccountResponse<P>,
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    pub(crate) fn sample_doctor_profile() -> DoctorProfile {
        DoctorProfile {
            first_name: "Gregory".to_string(),
            last_name: "House".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1965, 6, 11).unwrap(),
            gender: Gender::Male,
            address: Address::default(),
            qualification: "MD".to_string(),
            specialization: "Diagnostics".to_string(),
            hospital_affiliation: "Princeton-Plainsboro".to_string(),
            license_number: "NJ-12345".to_string(),
            years_of_experience: Some(20),
            primary_clinic_address: None,
            clinic_phone_number: None,
            clinic_email: None,
            consultation_fees: dec!(150.00),
            notes: None,
        }
    }

    fn account(updated_at: DateTime<Utc>) -> Account<DoctorProfile> {
        Account {
            id: Uuid::new_v4(),
            username: "house".to_string(),
            email: "house@example.com".to_string(),
            phone_number: "9876543210".to_string(),
            role: Role::Doctor,
            profile_picture: None,
            credentials: Credentials {
                password: HashedPassword::from_stored("$argon2id$stub".to_string()),
                refresh_token: Some("fingerprint".to_string()),
            },
            profile: sample_doctor_profile(),
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn test_inactive_after_five_years() {
        let now = Utc::now();
        let stale = account(now.checked_sub_months(Months::new(61)).unwrap());
        let fresh = account(now.checked_sub_months(Months::new(59)).unwrap());
        assert!(stale.is_inactive(now));
        assert!(!fresh.is_inactive(now));
    }

    #[test]
    fn test_response_strips_secrets() {
        let json = serde_json::to_value(account(Utc::now()).to_response()).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("password_hash").is_none());
        assert!(json.get("refresh_token").is_none());
        assert!(json.get("credentials").is_none());
        assert_eq!(json["first_name"], "Gregory");
        assert_eq!(json["is_inactive"], false);
    }

    #[test]
    fn test_principal_carries_display_name() {
        let principal = account(Utc::now()).to_principal().unwrap();
        assert_eq!(principal.display_name, "Gregory House");
        assert_eq!(principal.role, Role::Doctor);
        assert_eq!(principal.account["username"], "house");
    }

    #[test]
    fn test_role_resolution_per_kind() {
        assert_eq!(DoctorProfile::resolve_role(None).unwrap(), Role::Doctor);
        assert_eq!(PatientProfile::resolve_role(Some(Role::Patient)).unwrap(), Role::Patient);
        assert!(PatientProfile::resolve_role(Some(Role::Admin)).is_err());
        assert!(UserProfile::resolve_role(None).is_err());
        assert_eq!(UserProfile::resolve_role(Some(Role::Staff)).unwrap(), Role::Staff);
        assert!(UserProfile::resolve_role(Some(Role::Doctor)).is_err());
    }

    #[test]
    fn test_login_identifier_requires_exactly_one() {
        let both = LoginRequest {
            email: Some("a@b.com".into()),
            phone_number: Some("9876543210".into()),
            password: "x".into(),
        };
        let neither = LoginRequest {
            email: None,
            phone_number: Some("  ".into()),
            password: "x".into(),
        };
        let email = LoginRequest {
            email: Some("A@B.com".into()),
            phone_number: None,
            password: "x".into(),
        };
        assert!(both.identifier().is_err());
        assert!(neither.identifier().is_err());
        assert_eq!(
            email.identifier().unwrap(),
            LoginIdentifier::Email("a@b.com".to_string())
        );
    }

    #[test]
    fn test_register_request_flattens_profile() {
        let body = json!({
            "username": "house",
            "password": "vicodin-123",
            "email": "house@example.com",
            "phone_number": "9876543210",
            "first_name": "Gregory",
            "last_name": "House",
            "date_of_birth": "1965-06-11",
            "gender": "Male",
            "address": {"city": "Princeton"},
            "qualification": "MD",
            "specialization": "Diagnostics",
            "hospital_affiliation": "PPTH",
            "license_number": "NJ-1"
        });
        let request: RegisterRequest<DoctorProfile> = serde_json::from_value(body).unwrap();
        assert_eq!(request.identity.username, "house");
        assert_eq!(request.profile.gender, Gender::Male);
        assert_eq!(request.profile.consultation_fees, Decimal::ZERO);
        assert!(request.identity.validate().is_ok());
        assert!(request.profile.validate().is_ok());
    }

    #[test]
    fn test_blood_group_wire_format() {
        assert_eq!(serde_json::to_value(BloodGroup::AbNegative).unwrap(), "AB-");
        let parsed: BloodGroup = serde_json::from_value(json!("O+")).unwrap();
        assert_eq!(parsed, BloodGroup::OPositive);
    }
}
