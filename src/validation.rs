// Validation utilities module
// Custom validator functions for account and appointment fields

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use validator::ValidationError;

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+?\d{10,15}$").expect("phone pattern is valid"))
}

/// Validates a phone number: optional leading '+', then 10 to 15 digits
pub fn validate_phone_number(phone: &str) -> Result<(), ValidationError> {
    if phone_regex().is_match(phone.trim()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_phone_number");
        err.message = Some(format!("{} is not a valid phone number", phone).into());
        Err(err)
    }
}

/// Validates that a string is not only whitespace
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("must_not_be_blank"))
    } else {
        Ok(())
    }
}

/// Strictly after `now`; appointment dates must pass this
pub fn is_in_future(date: &DateTime<Utc>, now: DateTime<Utc>) -> bool {
    *date > now
}
