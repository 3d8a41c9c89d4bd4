//! Clinical and query inputs

use crate::{ValidationErrorCode, ValidationResult};

pub const MAX_PRESCRIPTION_DAYS: u32 = 365;
pub const MAX_PAGE_SIZE: usize = 100;

/// Validate the fields staff enter when adding a prescription
pub fn validate_prescription(medication: &str, dosage: &str, frequency: &str, duration_days: u32) -> ValidationResult {
    let mut result = ValidationResult::new();

    if medication.trim().is_empty() {
        result.add_error("medication", "Medication is required", ValidationErrorCode::Required);
    }
    if dosage.trim().is_empty() {
        result.add_error("dosage", "Dosage is required", ValidationErrorCode::Required);
    }
    if frequency.trim().is_empty() {
        result.add_error("frequency", "Frequency is required", ValidationErrorCode::Required);
    }
    if duration_days == 0 || duration_days > MAX_PRESCRIPTION_DAYS {
        result.add_error(
            "duration_days",
            &format!("Duration must be between 1 and {} days", MAX_PRESCRIPTION_DAYS),
            ValidationErrorCode::OutOfRange,
        );
    }

    result
}

/// Validate a requested page size for log browsing
pub fn validate_page_size(size: usize) -> ValidationResult {
    let mut result = ValidationResult::new();

    if size == 0 || size > MAX_PAGE_SIZE {
        result.add_error(
            "size",
            &format!("Page size must be between 1 and {}", MAX_PAGE_SIZE),
            ValidationErrorCode::OutOfRange,
        );
    }

    result
}
