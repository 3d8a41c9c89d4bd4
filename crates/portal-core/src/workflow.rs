//! Record access workflow
//!
//! Drives one front-desk session:
//!
//! ```text
//! Idle --lookup--> RecordLoaded(unconfirmed) --OTP / staff--> RecordLoaded(confirmed)
//!   \                                                              |
//!    +--not found--> CreatingPatient --create + re-lookup----------+
//! ```
//!
//! Every lookup is a single `scan_medical_record` call wrapped in an
//! abortable future. Methods take `&mut self`, so one workflow never has two
//! lookups outstanding; a [`LookupCanceller`] taken beforehand can abort the
//! running one from elsewhere.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use futures::future::{AbortHandle, Abortable};
use hospital_portal_validation::{validate_prescription, validate_required, CardNumberPolicy};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::HospitalApi;
use crate::card_number::CardNumber;
use crate::error::WorkflowError;
use crate::model::{AuditAction, ConfirmationMethod, MedicalRecord, NewAccessLog, NewPrescription, Patient, Prescription};
use crate::otp::OtpDialog;
use crate::records::{FullRecordView, PatientSummary, RecordView};
use crate::registration::PatientForm;
use crate::scanner::{CameraBackend, DevicePreferenceStore, QrScanner, ScanFeedback};

/// How (and whether) the patient's identity was confirmed for the loaded record
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityConfirmation {
    Unconfirmed,
    Otp { staff_username: String },
    Staff { staff_username: String },
}

impl IdentityConfirmation {
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, IdentityConfirmation::Unconfirmed)
    }

    pub fn method(&self) -> Option<ConfirmationMethod> {
        match self {
            IdentityConfirmation::Unconfirmed => None,
            IdentityConfirmation::Otp { .. } => Some(ConfirmationMethod::Otp),
            IdentityConfirmation::Staff { .. } => Some(ConfirmationMethod::StaffConfirmation),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WorkflowState {
    Idle,
    RecordLoaded {
        record: MedicalRecord,
        confirmation: IdentityConfirmation,
    },
    CreatingPatient {
        form: PatientForm,
    },
    Failed {
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    Found { patient_id: i64 },
    NotFound { card_number: CardNumber },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Transient message for the front end (toast / status line)
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Aborts the lookup currently running on a workflow
#[derive(Clone, Debug, Default)]
pub struct LookupCanceller {
    handle: Arc<Mutex<Option<AbortHandle>>>,
}

impl LookupCanceller {
    /// Returns whether a lookup was running
    pub fn cancel(&self) -> bool {
        match self.slot().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn arm(&self, handle: AbortHandle) {
        *self.slot() = Some(handle);
    }

    fn disarm(&self) {
        self.slot().take();
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<AbortHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fields staff fill in to add a prescription
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrescriptionInput {
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: u32,
    pub notes: Option<String>,
}

pub struct RecordAccessWorkflow {
    api: Arc<dyn HospitalApi>,
    staff_username: String,
    policy: CardNumberPolicy,
    state: WorkflowState,
    notifications: Vec<Notification>,
    canceller: LookupCanceller,
}

impl RecordAccessWorkflow {
    pub fn new(api: Arc<dyn HospitalApi>, staff_username: impl Into<String>) -> Self {
        Self {
            api,
            staff_username: staff_username.into(),
            policy: CardNumberPolicy::Staff,
            state: WorkflowState::Idle,
            notifications: Vec::new(),
            canceller: LookupCanceller::default(),
        }
    }

    pub fn with_policy(mut self, policy: CardNumberPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn staff_username(&self) -> &str {
        &self.staff_username
    }

    pub fn api(&self) -> &dyn HospitalApi {
        self.api.as_ref()
    }

    /// Handle that can abort the next (or current) lookup
    pub fn canceller(&self) -> LookupCanceller {
        self.canceller.clone()
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Abort any lookup and return to the empty panel
    pub fn reset(&mut self) {
        self.canceller.cancel();
        self.state = WorkflowState::Idle;
    }

    /// Card number typed into the lookup field
    ///
    /// Input rejected by the format check leaves the current state untouched,
    /// including a confirmed record; only a lookup that runs resets confirmation.
    pub async fn submit_manual(&mut self, input: &str) -> Result<LookupOutcome, WorkflowError> {
        let card_number = CardNumber::parse(input, self.policy)?;
        self.lookup(card_number).await
    }

    /// Text decoded by the QR scanner
    pub async fn submit_scan(&mut self, decoded: &str) -> Result<LookupOutcome, WorkflowError> {
        debug!("Scanned card submitted");
        let card_number = CardNumber::parse(decoded, self.policy)?;
        self.lookup(card_number).await
    }

    /// Forward a scanner decode callback to the lookup
    ///
    /// Only the decode the scanner honors reaches the backend; callbacks the
    /// scanner ignores return `None` and make no call.
    pub async fn submit_decoded<C, F, S>(
        &mut self,
        scanner: &mut QrScanner<C, F, S>,
        text: &str,
    ) -> Option<Result<LookupOutcome, WorkflowError>>
    where
        C: CameraBackend,
        F: ScanFeedback,
        S: DevicePreferenceStore,
    {
        let decoded = scanner.on_decoded(text).await?;
        Some(self.submit_scan(&decoded).await)
    }

    async fn lookup(&mut self, card_number: CardNumber) -> Result<LookupOutcome, WorkflowError> {
        let (handle, registration) = AbortHandle::new_pair();
        self.canceller.arm(handle);

        info!("Looking up medical record for card {}", card_number);
        let api = Arc::clone(&self.api);
        let key = card_number.clone();
        let response = Abortable::new(async move { api.scan_medical_record(&key).await }, registration).await;
        self.canceller.disarm();

        let result = match response {
            Ok(result) => result,
            Err(_aborted) => {
                info!("Lookup for card {} cancelled", card_number);
                return Err(WorkflowError::Cancelled);
            }
        };

        match result {
            Ok(record) => {
                let patient_id = record.patient.id;
                info!("Found patient {} for card {}", patient_id, card_number);
                self.notify(
                    NotificationLevel::Success,
                    format!("Patient record found: {}", record.patient.full_name()),
                );
                self.state = WorkflowState::RecordLoaded {
                    record,
                    confirmation: IdentityConfirmation::Unconfirmed,
                };
                Ok(LookupOutcome::Found { patient_id })
            }
            Err(e) if e.is_not_found() => {
                info!("No patient for card {}, opening creation form", card_number);
                self.notify(
                    NotificationLevel::Warning,
                    format!("No patient found with card number {}. Please create a new patient.", card_number),
                );
                self.state = WorkflowState::CreatingPatient {
                    form: PatientForm::for_recovery(Some(card_number.clone())),
                };
                Ok(LookupOutcome::NotFound { card_number })
            }
            Err(e) => {
                warn!("Lookup for card {} failed: {}", card_number, e);
                let message = e.user_message();
                self.notify(NotificationLevel::Error, message.clone());
                self.state = WorkflowState::Failed { message };
                Err(e.into())
            }
        }
    }

    pub fn loaded_record(&self) -> Option<&MedicalRecord> {
        match &self.state {
            WorkflowState::RecordLoaded { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn loaded_patient(&self) -> Option<&Patient> {
        self.loaded_record().map(|r| &r.patient)
    }

    pub fn confirmation(&self) -> Option<&IdentityConfirmation> {
        match &self.state {
            WorkflowState::RecordLoaded { confirmation, .. } => Some(confirmation),
            _ => None,
        }
    }

    /// Summary until identity is confirmed, the full tabbed record afterwards
    pub fn record_view(&self, today: NaiveDate) -> Option<RecordView<'_>> {
        match &self.state {
            WorkflowState::RecordLoaded { record, confirmation } if confirmation.is_confirmed() => {
                Some(RecordView::Full(FullRecordView::new(record, today)))
            }
            WorkflowState::RecordLoaded { record, .. } => {
                Some(RecordView::Summary(PatientSummary::from_record(record, today)))
            }
            _ => None,
        }
    }

    /// Open the verification dialog and send the first code
    ///
    /// A send failure is shown in the dialog and as a notification; the
    /// dialog is still returned so staff can resend.
    pub async fn request_otp(&mut self) -> Result<OtpDialog, WorkflowError> {
        let patient_id = self
            .loaded_patient()
            .map(|p| p.id)
            .ok_or(WorkflowError::InvalidState("no patient record is loaded"))?;

        let mut dialog = OtpDialog::new(patient_id, self.staff_username.clone());
        match dialog.send_code(self.api.as_ref()).await {
            Ok(()) => self.notify(NotificationLevel::Info, "Verification code sent to the patient".to_string()),
            Err(e) => self.notify(NotificationLevel::Error, e.to_string()),
        }
        Ok(dialog)
    }

    /// Verify the code in `dialog`; on success the full record is disclosed
    pub async fn confirm_with_otp(&mut self, dialog: &mut OtpDialog, purpose: &str) -> Result<(), WorkflowError> {
        let patient_id = self.unconfirmed_patient_id()?;
        if dialog.patient_id() != patient_id {
            return Err(WorkflowError::InvalidState("verification dialog belongs to another patient"));
        }

        dialog.verify(self.api.as_ref()).await?;
        info!("Identity of patient {} verified by OTP", patient_id);
        self.set_confirmation(IdentityConfirmation::Otp {
            staff_username: self.staff_username.clone(),
        });
        self.notify(NotificationLevel::Success, "Identity verified".to_string());
        self.log_access(patient_id, ConfirmationMethod::Otp, purpose).await;
        Ok(())
    }

    /// Staff vouch for the patient's identity in person
    pub async fn confirm_by_staff(&mut self, purpose: &str) -> Result<(), WorkflowError> {
        validate_required(purpose, "purpose", "Purpose of access").into_result()?;
        let patient_id = self.unconfirmed_patient_id()?;

        info!("Identity of patient {} confirmed by {}", patient_id, self.staff_username);
        self.set_confirmation(IdentityConfirmation::Staff {
            staff_username: self.staff_username.clone(),
        });
        self.notify(NotificationLevel::Success, "Identity confirmed by staff".to_string());
        self.log_access(patient_id, ConfirmationMethod::StaffConfirmation, purpose).await;
        Ok(())
    }

    fn unconfirmed_patient_id(&self) -> Result<i64, WorkflowError> {
        match &self.state {
            WorkflowState::RecordLoaded { confirmation, .. } if confirmation.is_confirmed() => {
                Err(WorkflowError::InvalidState("identity is already confirmed"))
            }
            WorkflowState::RecordLoaded { record, .. } => Ok(record.patient.id),
            _ => Err(WorkflowError::InvalidState("no patient record is loaded")),
        }
    }

    fn set_confirmation(&mut self, value: IdentityConfirmation) {
        if let WorkflowState::RecordLoaded { confirmation, .. } = &mut self.state {
            *confirmation = value;
        }
    }

    /// Best effort: a failed log entry never revokes disclosure
    async fn log_access(&mut self, patient_id: i64, method: ConfirmationMethod, purpose: &str) {
        let entry = NewAccessLog {
            patient_id,
            staff_username: self.staff_username.clone(),
            action: AuditAction::ViewRecord,
            granted: true,
            purpose: purpose.trim().to_string(),
            confirmation: method,
        };
        match self.api.record_access(&entry).await {
            Ok(logged) => debug!("Access to patient {} logged as entry {}", patient_id, logged.id),
            Err(e) => warn!("Failed to log record access for patient {}: {}", patient_id, e),
        }
    }

    pub fn recovery_form(&self) -> Option<&PatientForm> {
        match &self.state {
            WorkflowState::CreatingPatient { form } => Some(form),
            _ => None,
        }
    }

    pub fn recovery_form_mut(&mut self) -> Option<&mut PatientForm> {
        match &mut self.state {
            WorkflowState::CreatingPatient { form } => Some(form),
            _ => None,
        }
    }

    /// Create the patient from the recovery form, then look the new card up
    ///
    /// Validation failures and API errors leave the form in place so staff
    /// can correct it and resubmit.
    pub async fn submit_recovery(&mut self, today: NaiveDate) -> Result<LookupOutcome, WorkflowError> {
        let form = self
            .recovery_form()
            .ok_or(WorkflowError::InvalidState("no patient creation form is open"))?;
        form.validate(today).into_result()?;
        let payload = form.to_new_patient();

        let created = match self.api.create_patient(&payload).await {
            Ok(patient) => patient,
            Err(e) => {
                warn!("Failed to create patient for card {}: {}", payload.card_number, e);
                self.notify(NotificationLevel::Error, e.user_message());
                return Err(e.into());
            }
        };
        info!("Created patient {} with card {}", created.id, created.card_number);
        self.notify(
            NotificationLevel::Success,
            format!("Patient {} created", created.full_name()),
        );

        self.lookup(CardNumber::from_backend(created.card_number)).await
    }

    /// Leave the creation form without submitting
    pub fn cancel_recovery(&mut self) {
        if matches!(self.state, WorkflowState::CreatingPatient { .. }) {
            self.state = WorkflowState::Idle;
        }
    }

    /// Add a prescription to the disclosed record and refresh it
    pub async fn add_prescription(&mut self, input: &PrescriptionInput) -> Result<Prescription, WorkflowError> {
        let patient_id = match &self.state {
            WorkflowState::RecordLoaded { record, confirmation } if confirmation.is_confirmed() => record.patient.id,
            WorkflowState::RecordLoaded { .. } => {
                return Err(WorkflowError::InvalidState("identity must be confirmed before prescribing"))
            }
            _ => return Err(WorkflowError::InvalidState("no patient record is loaded")),
        };
        validate_prescription(&input.medication, &input.dosage, &input.frequency, input.duration_days)
            .into_result()?;

        let request = NewPrescription {
            medication: input.medication.trim().to_string(),
            dosage: input.dosage.trim().to_string(),
            frequency: input.frequency.trim().to_string(),
            duration_days: input.duration_days,
            notes: input.notes.clone().filter(|n| !n.trim().is_empty()),
            prescribed_by: self.staff_username.clone(),
        };
        let created = self.api.add_prescription(patient_id, &request).await?;
        info!("Added prescription for {} to patient {}", created.medication, patient_id);

        let refreshed = self.api.medical_record_for_patient(patient_id).await;
        if let WorkflowState::RecordLoaded { record, .. } = &mut self.state {
            match refreshed {
                Ok(fresh) => *record = fresh,
                Err(e) => {
                    warn!("Failed to refresh record for patient {}: {}", patient_id, e);
                    record.prescriptions.push(created.clone());
                }
            }
        }
        self.notify(NotificationLevel::Success, "Prescription added".to_string());
        Ok(created)
    }

    fn notify(&mut self, level: NotificationLevel, message: String) {
        self.notifications.push(Notification { level, message });
    }
}
