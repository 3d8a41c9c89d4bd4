//! Identity fields: names, date of birth, password confirmation

use chrono::NaiveDate;

use crate::{ValidationErrorCode, ValidationResult};

pub const NAME_MAX_LEN: usize = 100;
pub const PASSWORD_MIN_LEN: usize = 8;

/// Validate a person name field
pub fn validate_name(name: &str, field: &str, label: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let name = name.trim();

    if name.is_empty() {
        result.add_error(field, &format!("{} is required", label), ValidationErrorCode::Required);
        return result;
    }

    if name.chars().count() > NAME_MAX_LEN {
        result.add_error(
            field,
            &format!("{} cannot exceed {} characters", label, NAME_MAX_LEN),
            ValidationErrorCode::TooLong,
        );
    }

    if name.chars().any(|c| c.is_ascii_digit() || c.is_control()) {
        result.add_error(
            field,
            &format!("{} cannot contain digits", label),
            ValidationErrorCode::InvalidCharacters,
        );
    }

    result
}

/// Validate a date of birth: present and not after `today`
pub fn validate_date_of_birth(date_of_birth: Option<NaiveDate>, today: NaiveDate) -> ValidationResult {
    let mut result = ValidationResult::new();

    match date_of_birth {
        None => {
            result.add_error("date_of_birth", "Date of birth is required", ValidationErrorCode::Required);
        }
        Some(dob) if dob > today => {
            result.add_error(
                "date_of_birth",
                "Date of birth cannot be in the future",
                ValidationErrorCode::OutOfRange,
            );
        }
        Some(_) => {}
    }

    result
}

/// Validate an optional password and its confirmation
///
/// Nothing is checked when no password was entered: staff-created patients
/// get their credentials from the backend.
pub fn validate_password_confirmation(password: Option<&str>, confirmation: Option<&str>) -> ValidationResult {
    let mut result = ValidationResult::new();

    let Some(password) = password.filter(|p| !p.is_empty()) else {
        return result;
    };

    if password.chars().count() < PASSWORD_MIN_LEN {
        result.add_error(
            "password",
            &format!("Password must be at least {} characters", PASSWORD_MIN_LEN),
            ValidationErrorCode::TooShort,
        );
    }

    if confirmation != Some(password) {
        result.add_error("confirm_password", "Passwords do not match", ValidationErrorCode::Mismatch);
    }

    result
}
