//! Card numbers: the lookup key printed on patient cards and QR codes

use chrono::{DateTime, Datelike, Utc};
use hospital_portal_validation::{validate_card_number, CardNumberPolicy, ValidationResult};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Prefix used for provisional numbers generated at the desk
pub const PROVISIONAL_PREFIX: &str = "HOSP";

/// A card number that has either passed format validation or came from the backend
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardNumber(String);

impl CardNumber {
    /// Normalize user or scanner input and check it against `policy`
    ///
    /// Normalization only trims surrounding whitespace (scanners often append
    /// a newline); case is never changed.
    pub fn parse(input: &str, policy: CardNumberPolicy) -> Result<Self, ValidationResult> {
        let normalized = input.trim();
        validate_card_number(normalized, policy).into_result()?;
        Ok(CardNumber(normalized.to_string()))
    }

    /// Wrap a number issued by the backend without re-validating it
    pub fn from_backend(value: impl Into<String>) -> Self {
        CardNumber(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CardNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CardNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build a card number from a timestamp and a random suffix
///
/// Format: `PREFIX-YYYY-MMMRRR` where `MMM` are the millisecond digits of
/// `now` and `RRR` is random. Uniqueness is not guaranteed; the backend
/// assigns the authoritative number on creation.
pub fn generate_card_number<R: Rng + ?Sized>(prefix: &str, now: DateTime<Utc>, rng: &mut R) -> CardNumber {
    let millis = now.timestamp_millis().rem_euclid(1000);
    let suffix: u32 = rng.gen_range(0..1000);
    CardNumber(format!("{}-{}-{:03}{:03}", prefix, now.year(), millis, suffix))
}

/// Provisional number shown on a creation form before the backend assigns one
pub fn provisional_card_number() -> CardNumber {
    generate_card_number(PROVISIONAL_PREFIX, Utc::now(), &mut rand::thread_rng())
}
