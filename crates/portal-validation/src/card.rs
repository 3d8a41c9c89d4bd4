//! Card number formats
//!
//! A card number is `PREFIX-YYYY-NNN...`: an uppercase letter prefix, a
//! four digit year and a serial of at least three digits. The front desk and
//! the patient self-service pages accept different prefix lengths.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{ValidationErrorCode, ValidationResult};

static STAFF_CARD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3,4}-[0-9]{4}-[0-9]{3,}$").expect("staff card pattern compiles"));

static SELF_SERVICE_CARD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{1,4}-[0-9]{4}-[0-9]{3,}$").expect("self-service card pattern compiles"));

/// Which entry point a card number was typed into
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CardNumberPolicy {
    /// Front desk scanner panel: 3-4 letter prefix
    #[default]
    Staff,
    /// Patient self-service pages: 1-4 letter prefix
    SelfService,
}

impl CardNumberPolicy {
    pub fn pattern(&self) -> &'static Regex {
        match self {
            CardNumberPolicy::Staff => &STAFF_CARD_PATTERN,
            CardNumberPolicy::SelfService => &SELF_SERVICE_CARD_PATTERN,
        }
    }

    /// Example shown next to the input
    pub fn example(&self) -> &'static str {
        match self {
            CardNumberPolicy::Staff => "ABC-2024-123",
            CardNumberPolicy::SelfService => "P-2024-123",
        }
    }

    pub fn matches(&self, card_number: &str) -> bool {
        self.pattern().is_match(card_number)
    }
}

/// Validate a card number against the policy of the entry point
///
/// The input is expected to be normalized already (trimmed); the check
/// itself is exact and case-sensitive.
pub fn validate_card_number(card_number: &str, policy: CardNumberPolicy) -> ValidationResult {
    let mut result = ValidationResult::new();

    if card_number.is_empty() {
        result.add_error("card_number", "Card number is required", ValidationErrorCode::Required);
        return result;
    }

    if !policy.matches(card_number) {
        result.add_error(
            "card_number",
            &format!("Invalid card number format (expected e.g. {})", policy.example()),
            ValidationErrorCode::InvalidFormat,
        );
    }

    result
}
