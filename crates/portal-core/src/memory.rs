//! In-memory hospital backend
//!
//! Serves the desk in `--offline` mode and stands in for the REST API in
//! tests. Behaves like the backend where the workflow can observe it:
//! not-found classification, OTP issue/verify, append-only audit trail,
//! slot availability. Also counts calls per operation and can inject
//! failures and latency.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use hospital_portal_validation::validate_prescription;
use rand::Rng;
use tracing::debug;

use crate::api::HospitalApi;
use crate::audit::{AccessLogQuery, AuditLogQuery};
use crate::card_number::{provisional_card_number, CardNumber};
use crate::error::ApiError;
use crate::model::{
    AccessLogEntry, Appointment, AppointmentStatus, AuditAction, AuditLogEntry, BookAppointmentRequest,
    MedicalRecord, Medication, NewAccessLog, NewPatient, NewPrescription, OtpSendRequest, OtpVerifyRequest,
    OtpVerifyResponse, Page, Patient, Prescription, Provider, TestResult, TimeSlot, Vaccination, Visit,
};

/// Actor recorded for calls that carry no staff username
const SYSTEM_ACTOR: &str = "system";

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<i64, MedicalRecord>,
    providers: Vec<Provider>,
    slots: Vec<TimeSlot>,
    appointments: Vec<Appointment>,
    access_logs: Vec<AccessLogEntry>,
    audit_logs: Vec<AuditLogEntry>,
    otp_codes: HashMap<i64, String>,
    next_id: i64,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, VecDeque<ApiError>>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn audit(&mut self, username: &str, action: AuditAction, entity_type: &str, entity_id: Option<String>, granted: bool) {
        let id = self.next_id();
        self.audit_logs.push(AuditLogEntry {
            id,
            user_id: None,
            username: username.to_string(),
            action,
            entity_type: entity_type.to_string(),
            entity_id,
            timestamp: Utc::now(),
            granted,
            details: None,
        });
    }

    fn record_by_card(&self, card_number: &CardNumber) -> Option<&MedicalRecord> {
        self.records.values().find(|r| r.patient.card_number == card_number.as_str())
    }

    fn record_mut(&mut self, patient_id: i64) -> Result<&mut MedicalRecord, ApiError> {
        self.records
            .get_mut(&patient_id)
            .ok_or_else(|| ApiError::NotFound(format!("Patient {} not found", patient_id)))
    }
}

#[derive(Default)]
pub struct InMemoryApi {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl InMemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend seeded with a few patients, providers and this week's slots
    pub fn with_demo_data() -> Self {
        let api = Self::new();
        seed_demo_data(&api, Utc::now().date_naive());
        api
    }

    /// Delay every call by `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Store a record; its patient id becomes the key
    pub fn add_record(&self, record: MedicalRecord) {
        let mut state = self.lock();
        state.next_id = state.next_id.max(record.patient.id);
        state.records.insert(record.patient.id, record);
    }

    pub fn add_provider(&self, provider: Provider) {
        self.lock().providers.push(provider);
    }

    pub fn add_slot(&self, slot: TimeSlot) {
        self.lock().slots.push(slot);
    }

    pub fn add_audit_entry(&self, entry: AuditLogEntry) {
        self.lock().audit_logs.push(entry);
    }

    /// Make the next call to `operation` fail with `error`
    pub fn fail_next(&self, operation: &'static str, error: ApiError) {
        self.lock().failures.entry(operation).or_default().push_back(error);
    }

    /// Number of calls made to `operation` (the trait method name)
    pub fn calls(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Code most recently issued for `patient_id`, as the patient's phone would show it
    pub fn issued_otp(&self, patient_id: i64) -> Option<String> {
        self.lock().otp_codes.get(&patient_id).cloned()
    }

    pub fn recorded_access(&self) -> Vec<AccessLogEntry> {
        self.lock().access_logs.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, operation: &'static str) -> Result<(), ApiError> {
        let failure = {
            let mut state = self.lock();
            *state.calls.entry(operation).or_insert(0) += 1;
            state.failures.get_mut(operation).and_then(VecDeque::pop_front)
        };
        debug!("In-memory backend call: {}", operation);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn not_found_card(card_number: &CardNumber) -> ApiError {
    ApiError::NotFound(format!("No patient found with card number {}", card_number))
}

fn apply(patient: &mut Patient, update: &NewPatient) {
    patient.card_number = update.card_number.clone();
    patient.first_name = update.first_name.clone();
    patient.last_name = update.last_name.clone();
    patient.email = update.email.clone();
    patient.phone = update.phone.clone();
    patient.address = update.address.clone();
    patient.date_of_birth = update.date_of_birth;
    patient.gender = update.gender.clone();
    patient.blood_type = update.blood_type.clone();
    patient.allergies = update.allergies.clone();
    patient.emergency_contact_name = update.emergency_contact_name.clone();
    patient.emergency_contact_phone = update.emergency_contact_phone.clone();
}

#[async_trait]
impl HospitalApi for InMemoryApi {
    async fn list_patients(&self) -> Result<Vec<Patient>, ApiError> {
        self.enter("list_patients").await?;
        Ok(self.lock().records.values().map(|r| r.patient.clone()).collect())
    }

    async fn get_patient(&self, patient_id: i64) -> Result<Patient, ApiError> {
        self.enter("get_patient").await?;
        let mut state = self.lock();
        let patient = state.record_mut(patient_id)?.patient.clone();
        Ok(patient)
    }

    async fn find_patient_by_card(&self, card_number: &CardNumber) -> Result<Patient, ApiError> {
        self.enter("find_patient_by_card").await?;
        let state = self.lock();
        let patient = state.record_by_card(card_number).map(|r| r.patient.clone());
        patient.ok_or_else(|| not_found_card(card_number))
    }

    async fn create_patient(&self, patient: &NewPatient) -> Result<Patient, ApiError> {
        self.enter("create_patient").await?;
        let mut state = self.lock();

        let card_number = if patient.card_number.trim().is_empty() {
            provisional_card_number().to_string()
        } else {
            patient.card_number.clone()
        };
        if state.records.values().any(|r| r.patient.card_number == card_number) {
            return Err(ApiError::Rejected(format!("Card number {} is already registered", card_number)));
        }

        let id = state.next_id();
        let mut created = Patient {
            id,
            card_number: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: String::new(),
            address: None,
            date_of_birth: None,
            gender: None,
            blood_type: None,
            allergies: None,
            chronic_conditions: None,
            emergency_contact_name: None,
            emergency_contact_phone: None,
        };
        apply(&mut created, patient);
        created.card_number = card_number;

        state.records.insert(id, MedicalRecord::empty(created.clone()));
        state.audit(SYSTEM_ACTOR, AuditAction::Create, "Patient", Some(id.to_string()), true);
        Ok(created)
    }

    async fn update_patient(&self, patient_id: i64, patient: &NewPatient) -> Result<Patient, ApiError> {
        self.enter("update_patient").await?;
        let mut state = self.lock();
        let record = state.record_mut(patient_id)?;
        apply(&mut record.patient, patient);
        let updated = record.patient.clone();
        state.audit(SYSTEM_ACTOR, AuditAction::Update, "Patient", Some(patient_id.to_string()), true);
        Ok(updated)
    }

    async fn delete_patient(&self, patient_id: i64) -> Result<(), ApiError> {
        self.enter("delete_patient").await?;
        let mut state = self.lock();
        state
            .records
            .remove(&patient_id)
            .ok_or_else(|| ApiError::NotFound(format!("Patient {} not found", patient_id)))?;
        state.audit(SYSTEM_ACTOR, AuditAction::Delete, "Patient", Some(patient_id.to_string()), true);
        Ok(())
    }

    async fn scan_medical_record(&self, card_number: &CardNumber) -> Result<MedicalRecord, ApiError> {
        self.enter("scan_medical_record").await?;
        let mut state = self.lock();
        let record = state.record_by_card(card_number).cloned();
        let entity_id = record.as_ref().map(|r| r.patient.id.to_string());
        state.audit(SYSTEM_ACTOR, AuditAction::ScanCard, "MedicalRecord", entity_id, record.is_some());
        record.ok_or_else(|| not_found_card(card_number))
    }

    async fn medical_record_for_patient(&self, patient_id: i64) -> Result<MedicalRecord, ApiError> {
        self.enter("medical_record_for_patient").await?;
        let mut state = self.lock();
        let record = state.record_mut(patient_id)?.clone();
        Ok(record)
    }

    async fn add_prescription(&self, patient_id: i64, prescription: &NewPrescription) -> Result<Prescription, ApiError> {
        self.enter("add_prescription").await?;
        let check = validate_prescription(
            &prescription.medication,
            &prescription.dosage,
            &prescription.frequency,
            prescription.duration_days,
        );
        if !check.is_valid() {
            return Err(ApiError::Rejected(check.to_string()));
        }

        let mut state = self.lock();
        let id = state.next_id();
        let created = Prescription {
            id: Some(id),
            medication: prescription.medication.clone(),
            dosage: prescription.dosage.clone(),
            frequency: prescription.frequency.clone(),
            duration_days: Some(prescription.duration_days),
            notes: prescription.notes.clone(),
            prescribed_by: Some(prescription.prescribed_by.clone()),
            prescribed_at: Some(Utc::now()),
        };
        state.record_mut(patient_id)?.prescriptions.push(created.clone());
        state.audit(
            &prescription.prescribed_by,
            AuditAction::Create,
            "Prescription",
            Some(id.to_string()),
            true,
        );
        Ok(created)
    }

    async fn list_providers(&self) -> Result<Vec<Provider>, ApiError> {
        self.enter("list_providers").await?;
        Ok(self.lock().providers.clone())
    }

    async fn list_time_slots(&self, provider_id: i64, date: NaiveDate) -> Result<Vec<TimeSlot>, ApiError> {
        self.enter("list_time_slots").await?;
        let state = self.lock();
        if !state.providers.iter().any(|p| p.id == provider_id) {
            return Err(ApiError::NotFound(format!("Provider {} not found", provider_id)));
        }
        let mut slots: Vec<TimeSlot> = state
            .slots
            .iter()
            .filter(|s| s.provider_id == provider_id && s.start_time.date_naive() == date)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.start_time);
        Ok(slots)
    }

    async fn book_appointment(&self, request: &BookAppointmentRequest) -> Result<Appointment, ApiError> {
        self.enter("book_appointment").await?;
        let mut state = self.lock();
        if !state.records.contains_key(&request.patient_id) {
            return Err(ApiError::NotFound(format!("Patient {} not found", request.patient_id)));
        }
        let slot = state
            .slots
            .iter_mut()
            .find(|s| s.id == request.slot_id && s.provider_id == request.provider_id)
            .ok_or_else(|| ApiError::NotFound(format!("Time slot {} not found", request.slot_id)))?;
        if !slot.available {
            return Err(ApiError::Rejected("Time slot is no longer available".to_string()));
        }
        slot.available = false;
        let start_time = slot.start_time;

        let id = state.next_id();
        let appointment = Appointment {
            id,
            patient_id: request.patient_id,
            provider_id: request.provider_id,
            slot_id: Some(request.slot_id),
            start_time: Some(start_time),
            reason: Some(request.reason.clone()),
            status: AppointmentStatus::PendingPayment,
        };
        state.appointments.push(appointment.clone());
        state.audit(SYSTEM_ACTOR, AuditAction::Create, "Appointment", Some(id.to_string()), true);
        Ok(appointment)
    }

    async fn patient_appointments(&self, patient_id: i64) -> Result<Vec<Appointment>, ApiError> {
        self.enter("patient_appointments").await?;
        let state = self.lock();
        Ok(state.appointments.iter().filter(|a| a.patient_id == patient_id).cloned().collect())
    }

    async fn record_access(&self, entry: &NewAccessLog) -> Result<AccessLogEntry, ApiError> {
        self.enter("record_access").await?;
        let mut state = self.lock();
        let id = state.next_id();
        let created = AccessLogEntry {
            id,
            patient_id: entry.patient_id,
            staff_username: entry.staff_username.clone(),
            action: entry.action,
            granted: entry.granted,
            purpose: Some(entry.purpose.clone()),
            accessed_at: Utc::now(),
        };
        state.access_logs.push(created.clone());
        state.audit(
            &entry.staff_username,
            entry.action,
            "MedicalRecord",
            Some(entry.patient_id.to_string()),
            entry.granted,
        );
        Ok(created)
    }

    async fn access_logs(&self, query: &AccessLogQuery) -> Result<Vec<AccessLogEntry>, ApiError> {
        self.enter("access_logs").await?;
        let state = self.lock();
        let mut entries: Vec<AccessLogEntry> = state
            .access_logs
            .iter()
            .filter(|e| query.patient_id.map_or(true, |id| e.patient_id == id))
            .filter(|e| query.staff_username.as_deref().map_or(true, |s| e.staff_username == s))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.accessed_at.cmp(&a.accessed_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    async fn audit_logs(&self, query: &AuditLogQuery) -> Result<Page<AuditLogEntry>, ApiError> {
        self.enter("audit_logs").await?;
        let check = query.validate();
        if !check.is_valid() {
            return Err(ApiError::Rejected(check.to_string()));
        }

        let state = self.lock();
        let mut matching: Vec<AuditLogEntry> = state
            .audit_logs
            .iter()
            .filter(|e| query.user_id.map_or(true, |id| e.user_id == Some(id)))
            .filter(|e| query.username.as_deref().map_or(true, |u| e.username == u))
            .filter(|e| query.action.map_or(true, |a| e.action == a))
            .filter(|e| query.entity_type.as_deref().map_or(true, |t| e.entity_type == t))
            .filter(|e| query.entity_id.as_deref().map_or(true, |id| e.entity_id.as_deref() == Some(id)))
            .filter(|e| query.start.map_or(true, |start| e.timestamp >= start))
            .filter(|e| query.end.map_or(true, |end| e.timestamp <= end))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        let total_items = matching.len();
        let total_pages = total_items.div_ceil(query.size);
        let content = matching.into_iter().skip(query.page.saturating_mul(query.size)).take(query.size).collect();
        Ok(Page {
            content,
            current_page: query.page,
            total_items: total_items as u64,
            total_pages,
        })
    }

    async fn send_otp(&self, request: &OtpSendRequest) -> Result<(), ApiError> {
        self.enter("send_otp").await?;
        let mut state = self.lock();
        state.record_mut(request.patient_id)?;
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        state.otp_codes.insert(request.patient_id, code);
        Ok(())
    }

    async fn verify_otp(&self, request: &OtpVerifyRequest) -> Result<OtpVerifyResponse, ApiError> {
        self.enter("verify_otp").await?;
        let mut state = self.lock();
        let matches = state.otp_codes.get(&request.patient_id) == Some(&request.otp_code);
        if matches {
            state.otp_codes.remove(&request.patient_id);
        }
        state.audit(
            &request.staff_username,
            AuditAction::VerifyOtp,
            "Patient",
            Some(request.patient_id.to_string()),
            matches,
        );
        Ok(if matches {
            OtpVerifyResponse { success: true, message: None }
        } else {
            OtpVerifyResponse {
                success: false,
                message: Some("Invalid or expired verification code".to_string()),
            }
        })
    }
}

fn at(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    date.and_hms_opt(hour, 0, 0).unwrap_or_default().and_utc()
}

/// Seed patients, providers and hourly slots for the week starting at `today`
pub fn seed_demo_data(api: &InMemoryApi, today: NaiveDate) {
    let alice = Patient {
        id: 1,
        card_number: "ABC-2024-123".to_string(),
        first_name: "Alice".to_string(),
        last_name: "Johnson".to_string(),
        email: "alice.johnson@example.com".to_string(),
        phone: "5550123456".to_string(),
        address: Some("12 Harbour Road, Springfield".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(1985, 4, 12),
        gender: Some("FEMALE".to_string()),
        blood_type: Some("A+".to_string()),
        allergies: Some("Penicillin".to_string()),
        chronic_conditions: Some("Type 2 diabetes".to_string()),
        emergency_contact_name: Some("Bob Johnson".to_string()),
        emergency_contact_phone: Some("5550199999".to_string()),
    };
    let mut record = MedicalRecord::empty(alice);
    record.medications.push(Medication {
        name: "Metformin".to_string(),
        dosage: Some("500mg".to_string()),
        frequency: Some("Twice daily".to_string()),
        start_date: NaiveDate::from_ymd_opt(2022, 3, 1),
        end_date: None,
        active: true,
    });
    record.prescriptions.push(Prescription {
        id: Some(100),
        medication: "Metformin".to_string(),
        dosage: "500mg".to_string(),
        frequency: "Twice daily".to_string(),
        duration_days: Some(90),
        notes: Some("Take with meals".to_string()),
        prescribed_by: Some("Dr. Grey".to_string()),
        prescribed_at: None,
    });
    record.test_results.push(TestResult {
        test_name: "HbA1c".to_string(),
        result: "6.8".to_string(),
        unit: Some("%".to_string()),
        reference_range: Some("4.0-5.6".to_string()),
        status: Some("HIGH".to_string()),
        performed_at: Some(at(today - ChronoDuration::days(30), 9)),
    });
    record.vaccinations.push(Vaccination {
        vaccine: "Influenza".to_string(),
        dose: Some("Annual".to_string()),
        administered_on: Some(today - ChronoDuration::days(120)),
        administered_by: Some("Nurse Joy".to_string()),
    });
    record.visit_history.push(Visit {
        visit_date: today - ChronoDuration::days(30),
        department: Some("Endocrinology".to_string()),
        provider: Some("Dr. Grey".to_string()),
        reason: Some("Quarterly review".to_string()),
        diagnosis: Some("Type 2 diabetes, stable".to_string()),
        notes: None,
    });
    api.add_record(record);

    api.add_record(MedicalRecord::empty(Patient {
        id: 2,
        card_number: "HOSP-2024-042".to_string(),
        first_name: "Carlos".to_string(),
        last_name: "Mendes".to_string(),
        email: "carlos.mendes@example.com".to_string(),
        phone: "5550177777".to_string(),
        address: None,
        date_of_birth: NaiveDate::from_ymd_opt(1972, 11, 3),
        gender: Some("MALE".to_string()),
        blood_type: Some("O-".to_string()),
        allergies: None,
        chronic_conditions: None,
        emergency_contact_name: None,
        emergency_contact_phone: None,
    }));

    let providers = [
        (10, "Dr. Meredith Grey", "General Surgery", "Surgery"),
        (11, "Dr. Gregory House", "Diagnostic Medicine", "Internal Medicine"),
    ];
    let mut slot_id = 1000;
    for (id, name, specialty, department) in providers {
        api.add_provider(Provider {
            id,
            name: name.to_string(),
            specialty: specialty.to_string(),
            department: Some(department.to_string()),
        });
        for day in 0..7 {
            let date = today + ChronoDuration::days(day);
            for hour in 9..12 {
                slot_id += 1;
                api.add_slot(TimeSlot {
                    id: slot_id,
                    provider_id: id,
                    start_time: at(date, hour),
                    end_time: at(date, hour + 1),
                    available: hour != 10,
                });
            }
        }
    }
}
