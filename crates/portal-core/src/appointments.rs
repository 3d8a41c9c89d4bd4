//! Appointment booking
//!
//! Provider -> date -> slot -> reason. Payment is handled by the backend;
//! the booked appointment is returned with whatever status it assigns.

use chrono::NaiveDate;
use hospital_portal_validation::{validate_required, ValidationErrorCode, ValidationResult};
use tracing::info;

use crate::api::HospitalApi;
use crate::error::WorkflowError;
use crate::model::{Appointment, BookAppointmentRequest, TimeSlot};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookingDraft {
    pub patient_id: i64,
    pub provider_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub slot_id: Option<i64>,
    pub reason: String,
}

impl BookingDraft {
    pub fn new(patient_id: i64) -> Self {
        Self {
            patient_id,
            ..Default::default()
        }
    }

    /// Changing provider or date invalidates the chosen slot
    pub fn choose_provider(&mut self, provider_id: i64) {
        if self.provider_id != Some(provider_id) {
            self.slot_id = None;
        }
        self.provider_id = Some(provider_id);
    }

    pub fn choose_date(&mut self, date: NaiveDate) {
        if self.date != Some(date) {
            self.slot_id = None;
        }
        self.date = Some(date);
    }

    /// Check the draft against the slots last fetched for its provider and date
    pub fn validate(&self, slots: &[TimeSlot]) -> ValidationResult {
        let mut result = ValidationResult::new();

        let Some(provider_id) = self.provider_id else {
            result.add_error("provider", "Please select a provider", ValidationErrorCode::Required);
            return result;
        };

        match self.slot_id {
            None => result.add_error("slot", "Please select a time slot", ValidationErrorCode::Required),
            Some(slot_id) => match slots.iter().find(|s| s.id == slot_id && s.provider_id == provider_id) {
                None => result.add_error("slot", "Selected time slot does not exist", ValidationErrorCode::InvalidFormat),
                Some(slot) if !slot.available => result.add_error(
                    "slot",
                    "Selected time slot is no longer available",
                    ValidationErrorCode::OutOfRange,
                ),
                Some(_) => {}
            },
        }

        result.merge(validate_required(&self.reason, "reason", "Reason for visit"));
        result
    }

    fn to_request(&self) -> Option<BookAppointmentRequest> {
        Some(BookAppointmentRequest {
            patient_id: self.patient_id,
            provider_id: self.provider_id?,
            slot_id: self.slot_id?,
            reason: self.reason.trim().to_string(),
        })
    }
}

/// Slots that can still be booked, earliest first
pub fn available_slots(slots: &[TimeSlot]) -> Vec<&TimeSlot> {
    let mut free: Vec<&TimeSlot> = slots.iter().filter(|s| s.available).collect();
    free.sort_by_key(|s| s.start_time);
    free
}

/// Validate locally, then book; an unavailable slot never reaches the backend
pub async fn book_appointment(
    api: &dyn HospitalApi,
    draft: &BookingDraft,
    slots: &[TimeSlot],
) -> Result<Appointment, WorkflowError> {
    draft.validate(slots).into_result()?;
    let request = draft
        .to_request()
        .ok_or(WorkflowError::InvalidState("booking draft is incomplete"))?;
    let appointment = api.book_appointment(&request).await?;
    info!(
        "Booked appointment {} for patient {} with provider {} ({:?})",
        appointment.id, appointment.patient_id, appointment.provider_id, appointment.status
    );
    Ok(appointment)
}
