//! Contact details: required text, email, phone, postal address

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{ValidationErrorCode, ValidationResult};

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

pub const PHONE_DIGITS: usize = 10;
pub const ADDRESS_MIN_LEN: usize = 5;
pub const ADDRESS_MAX_LEN: usize = 200;

/// Validate that a text field is present (whitespace-only counts as empty)
pub fn validate_required(value: &str, field: &str, label: &str) -> ValidationResult {
    let mut result = ValidationResult::new();

    if value.trim().is_empty() {
        result.add_error(field, &format!("{} is required", label), ValidationErrorCode::Required);
    }

    result
}

/// Validate an email address
pub fn validate_email(email: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let email = email.trim();

    if email.is_empty() {
        result.add_error("email", "Email is required", ValidationErrorCode::Required);
        return result;
    }

    if !EMAIL_PATTERN.is_match(email) {
        result.add_error("email", "Please enter a valid email address", ValidationErrorCode::InvalidFormat);
    }

    result
}

/// Strip everything but ASCII digits from a phone number
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Validate a phone number: exactly ten digits once formatting is removed
pub fn validate_phone(phone: &str) -> ValidationResult {
    let mut result = ValidationResult::new();

    if phone.trim().is_empty() {
        result.add_error("phone", "Phone number is required", ValidationErrorCode::Required);
        return result;
    }

    let digits = phone_digits(phone);
    if digits.len() != PHONE_DIGITS {
        result.add_error(
            "phone",
            &format!("Phone number must be {} digits", PHONE_DIGITS),
            ValidationErrorCode::InvalidFormat,
        );
    }

    result
}

/// Validate an optional postal address (5-200 characters when present)
pub fn validate_address(address: Option<&str>) -> ValidationResult {
    let mut result = ValidationResult::new();

    let Some(address) = address.map(str::trim).filter(|a| !a.is_empty()) else {
        return result;
    };

    let len = address.chars().count();
    if len < ADDRESS_MIN_LEN {
        result.add_error(
            "address",
            &format!("Address must be at least {} characters", ADDRESS_MIN_LEN),
            ValidationErrorCode::TooShort,
        );
    }
    if len > ADDRESS_MAX_LEN {
        result.add_error(
            "address",
            &format!("Address cannot exceed {} characters", ADDRESS_MAX_LEN),
            ValidationErrorCode::TooLong,
        );
    }

    result
}
