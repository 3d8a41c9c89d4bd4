//! Hospital Portal core
//!
//! Front-desk logic for finding a patient's medical record from a card or
//! QR code, confirming the patient's identity and disclosing the record:
//!
//! - [`model`]: data exchanged with the hospital API
//! - [`api`]: the [`HospitalApi`] contract, implemented over HTTP by
//!   `hospital-portal-client` and in memory by [`memory::InMemoryApi`]
//! - [`scanner`]: QR scan adapter over a [`scanner::CameraBackend`]
//! - [`otp`]: six-cell verification dialog with resend cooldown
//! - [`registration`]: patient creation form (recovery and self-registration)
//! - [`records`]: summary and full tabbed record views
//! - [`workflow`]: the [`RecordAccessWorkflow`] state machine
//! - [`appointments`], [`audit`]: booking and log browsing
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hospital_portal_core::{memory::InMemoryApi, RecordAccessWorkflow};
//!
//! # async fn run() -> Result<(), hospital_portal_core::WorkflowError> {
//! let api = Arc::new(InMemoryApi::with_demo_data());
//! let mut workflow = RecordAccessWorkflow::new(api, "nurse.joy");
//! workflow.submit_manual("ABC-2024-123").await?;
//! workflow.confirm_by_staff("Walk-in consultation").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod appointments;
pub mod audit;
pub mod card_number;
pub mod error;
pub mod memory;
pub mod model;
pub mod otp;
pub mod records;
pub mod registration;
pub mod scanner;
pub mod workflow;

pub use api::HospitalApi;
pub use card_number::CardNumber;
pub use error::{ApiError, OtpError, ScanError, WorkflowError};
pub use hospital_portal_validation::{CardNumberPolicy, ValidationError, ValidationErrorCode, ValidationResult};
pub use otp::OtpDialog;
pub use registration::PatientForm;
pub use workflow::{LookupOutcome, RecordAccessWorkflow, WorkflowState};
