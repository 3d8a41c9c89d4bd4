//! Contract for the hospital REST API
//!
//! The HTTP client in `hospital-portal-client` implements this trait against
//! the real backend; [`crate::memory::InMemoryApi`] implements it for the
//! offline desk and for tests. Every method returns a classified [`ApiError`],
//! so callers match on `ApiError::NotFound` instead of inspecting messages.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::audit::{AccessLogQuery, AuditLogQuery};
use crate::card_number::CardNumber;
use crate::error::ApiError;
use crate::model::{
    AccessLogEntry, Appointment, AuditLogEntry, BookAppointmentRequest, MedicalRecord, NewAccessLog,
    NewPatient, NewPrescription, OtpSendRequest, OtpVerifyRequest, OtpVerifyResponse, Page, Patient,
    Prescription, Provider, TimeSlot,
};

#[async_trait]
pub trait HospitalApi: Send + Sync {
    // Patients
    async fn list_patients(&self) -> Result<Vec<Patient>, ApiError>;
    async fn get_patient(&self, patient_id: i64) -> Result<Patient, ApiError>;
    async fn find_patient_by_card(&self, card_number: &CardNumber) -> Result<Patient, ApiError>;
    async fn create_patient(&self, patient: &NewPatient) -> Result<Patient, ApiError>;
    async fn update_patient(&self, patient_id: i64, patient: &NewPatient) -> Result<Patient, ApiError>;
    async fn delete_patient(&self, patient_id: i64) -> Result<(), ApiError>;

    // Medical records
    async fn scan_medical_record(&self, card_number: &CardNumber) -> Result<MedicalRecord, ApiError>;
    async fn medical_record_for_patient(&self, patient_id: i64) -> Result<MedicalRecord, ApiError>;
    async fn add_prescription(&self, patient_id: i64, prescription: &NewPrescription) -> Result<Prescription, ApiError>;

    // Scheduling
    async fn list_providers(&self) -> Result<Vec<Provider>, ApiError>;
    async fn list_time_slots(&self, provider_id: i64, date: NaiveDate) -> Result<Vec<TimeSlot>, ApiError>;
    async fn book_appointment(&self, request: &BookAppointmentRequest) -> Result<Appointment, ApiError>;
    async fn patient_appointments(&self, patient_id: i64) -> Result<Vec<Appointment>, ApiError>;

    // Logs
    async fn record_access(&self, entry: &NewAccessLog) -> Result<AccessLogEntry, ApiError>;
    async fn access_logs(&self, query: &AccessLogQuery) -> Result<Vec<AccessLogEntry>, ApiError>;
    async fn audit_logs(&self, query: &AuditLogQuery) -> Result<Page<AuditLogEntry>, ApiError>;

    // Identity verification
    async fn send_otp(&self, request: &OtpSendRequest) -> Result<(), ApiError>;
    async fn verify_otp(&self, request: &OtpVerifyRequest) -> Result<OtpVerifyResponse, ApiError>;
}
