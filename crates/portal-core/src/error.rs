//! Error types shared by the API contract, scanner, OTP dialog and workflow

use hospital_portal_validation::ValidationResult;

/// Phrases a backend uses when a card number does not resolve to a patient
const NOT_FOUND_MARKERS: [&str; 3] = ["not found", "404", "no patient"];

pub const GENERIC_API_FAILURE: &str = "Something went wrong. Please try again.";

/// Failure of a backend call, classified once at the client boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl ApiError {
    /// Classify a failed response from its status and server message
    ///
    /// A 404, or a message naming a missing patient, becomes [`ApiError::NotFound`];
    /// call sites match on the variant and never re-parse the text.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 404 || is_not_found_message(&message) {
            return ApiError::NotFound(message);
        }
        match status {
            400 | 409 | 422 => ApiError::Rejected(message),
            _ => ApiError::Status { status, message },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// Transport failures and server-side errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Message for a notification: the server's text, or a generic fallback
    pub fn user_message(&self) -> String {
        let server_message = match self {
            ApiError::NotFound(m) | ApiError::Rejected(m) => m.as_str(),
            ApiError::Status { message, .. } => message.as_str(),
            ApiError::Network(_) | ApiError::Timeout(_) | ApiError::Decode(_) => "",
        };
        if server_message.trim().is_empty() {
            GENERIC_API_FAILURE.to_string()
        } else {
            server_message.to_string()
        }
    }
}

/// Case-insensitive check for the not-found phrases
pub fn is_not_found_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Camera and decoder failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("No camera found on this device")]
    NoCamera,

    #[error("Unable to list cameras: {0}")]
    Enumeration(String),

    #[error("Unable to start camera: {0}")]
    StreamInit(String),

    #[error("Unknown camera device: {0}")]
    UnknownDevice(String),

    #[error("Scanner is not open")]
    NotOpen,
}

/// Failures of the identity verification dialog
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    #[error("Please enter all 6 digits")]
    Incomplete,

    #[error("{0}")]
    Rejected(String),

    #[error("Please wait {0} seconds before requesting a new code")]
    CooldownActive(u32),

    #[error("Failed to send verification code: {0}")]
    SendFailed(String),
}

/// Errors returned by the record access workflow
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(ValidationResult),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error("Lookup was cancelled")]
    Cancelled,

    #[error("Invalid workflow state: {0}")]
    InvalidState(&'static str),
}

impl From<ValidationResult> for WorkflowError {
    fn from(result: ValidationResult) -> Self {
        WorkflowError::Validation(result)
    }
}
