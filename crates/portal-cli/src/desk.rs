//! Front desk commands

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use colored::*;
use hospital_portal_core::appointments::{available_slots, book_appointment, BookingDraft};
use hospital_portal_core::audit::{AccessLogQuery, AuditLogQuery};
use hospital_portal_core::memory::InMemoryApi;
use hospital_portal_core::records::{RecordTab, RecordView};
use hospital_portal_core::scanner::{
    CameraBackend, CameraDevice, MemoryDeviceStore, QrScanner, ScanState, SilentFeedback, StreamCapabilities,
};
use hospital_portal_core::workflow::PrescriptionInput;
use hospital_portal_core::{
    CardNumberPolicy, HospitalApi, LookupOutcome, OtpDialog, OtpError, PatientForm, RecordAccessWorkflow,
    ScanError, WorkflowError,
};
use tracing::debug;

use crate::{prompt, render};

/// How staff confirm the patient's identity before the full record is shown
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Otp,
    Staff,
}

/// USB or Bluetooth scanner that types each decoded code as a line on stdin
struct KeyboardWedge;

#[async_trait]
impl CameraBackend for KeyboardWedge {
    async fn enumerate_devices(&mut self) -> Result<Vec<CameraDevice>, ScanError> {
        Ok(vec![CameraDevice {
            id: "keyboard-wedge".to_string(),
            label: "Keyboard wedge scanner".to_string(),
        }])
    }

    async fn start_stream(&mut self, _device_id: &str) -> Result<StreamCapabilities, ScanError> {
        Ok(StreamCapabilities::default())
    }

    async fn stop_stream(&mut self) {}

    async fn set_torch(&mut self, _on: bool) -> Result<(), ScanError> {
        Ok(())
    }
}

pub struct LookupOptions {
    pub verify: Option<Verification>,
    pub purpose: String,
    pub tabs: Vec<RecordTab>,
    pub policy: CardNumberPolicy,
    pub prescribe: bool,
}

pub struct Desk {
    api: Arc<dyn HospitalApi>,
    /// Set in offline mode so issued codes can be shown on screen
    demo: Option<Arc<InMemoryApi>>,
    staff: String,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

impl Desk {
    pub fn new(api: Arc<dyn HospitalApi>, staff: String) -> Self {
        Self { api, demo: None, staff }
    }

    pub fn offline(staff: String) -> Self {
        let demo = Arc::new(InMemoryApi::with_demo_data());
        Self {
            api: demo.clone(),
            demo: Some(demo),
            staff,
        }
    }

    fn workflow(&self, policy: CardNumberPolicy) -> RecordAccessWorkflow {
        RecordAccessWorkflow::new(self.api.clone(), self.staff.clone()).with_policy(policy)
    }

    pub async fn lookup(&self, card: &str, options: LookupOptions) -> Result<()> {
        let mut workflow = self.workflow(options.policy);
        let outcome = submit(&mut workflow, card).await?;

        if let LookupOutcome::NotFound { card_number } = outcome {
            if !prompt::confirm(&format!("Create a new patient with card number {}?", card_number))? {
                return Ok(());
            }
            self.recover(&mut workflow).await?;
        }

        let Some(view) = workflow.record_view(today()) else {
            bail!("no record loaded");
        };
        render::summary(&view.summary());

        match options.verify {
            None => {
                println!("{}", "  Re-run with --verify otp|staff to open the full record.".dimmed());
                return Ok(());
            }
            Some(Verification::Staff) => {
                workflow.confirm_by_staff(&options.purpose).await?;
            }
            Some(Verification::Otp) => {
                if !self.verify_with_otp(&mut workflow, &options.purpose).await? {
                    return Ok(());
                }
            }
        }
        render::notifications(workflow.take_notifications());

        if let Some(RecordView::Full(full)) = workflow.record_view(today()) {
            let tabs = if options.tabs.is_empty() {
                RecordTab::ALL.to_vec()
            } else {
                options.tabs.clone()
            };
            for tab in tabs {
                render::tab(&full.render_tab(tab));
            }
        }

        if options.prescribe {
            self.prescribe(&mut workflow).await?;
        }
        Ok(())
    }

    /// Fill and submit the creation form until it is accepted or input ends
    async fn recover(&self, workflow: &mut RecordAccessWorkflow) -> Result<()> {
        let mut only: Option<Vec<String>> = None;
        loop {
            let form = workflow
                .recovery_form_mut()
                .ok_or_else(|| anyhow!("creation form is not open"))?;
            println!("  Card number: {} {}", form.card_number().bold(), "(locked)".dimmed());
            fill_form(form, only.as_deref())?;

            match workflow.submit_recovery(today()).await {
                Ok(_) => {
                    render::notifications(workflow.take_notifications());
                    return Ok(());
                }
                Err(WorkflowError::Validation(result)) => {
                    render::field_errors(&result);
                    only = Some(result.fields().into_iter().map(str::to_string).collect());
                }
                Err(e) => {
                    render::notifications(workflow.take_notifications());
                    if !prompt::confirm("Try again?")? {
                        return Err(e.into());
                    }
                    only = Some(Vec::new());
                }
            }
        }
    }

    /// Returns false when staff gave up
    async fn verify_with_otp(&self, workflow: &mut RecordAccessWorkflow, purpose: &str) -> Result<bool> {
        let mut dialog = workflow.request_otp().await?;
        render::notifications(workflow.take_notifications());
        self.show_demo_code(&dialog);
        let mut last_tick = Instant::now();

        loop {
            let Some(input) = prompt::line("Verification code (r = resend, q = quit)")? else {
                return Ok(false);
            };
            catch_up(&mut dialog, &mut last_tick);

            match input.trim() {
                "q" => return Ok(false),
                "r" => match dialog.resend(workflow.api()).await {
                    Ok(()) => {
                        println!("  New code sent.");
                        self.show_demo_code(&dialog);
                        last_tick = Instant::now();
                    }
                    Err(e) => eprintln!("  {}", e.to_string().yellow()),
                },
                code => {
                    dialog.entry_mut().clear();
                    dialog.entry_mut().paste(code);
                    match workflow.confirm_with_otp(&mut dialog, purpose).await {
                        Ok(()) => return Ok(true),
                        Err(WorkflowError::Otp(OtpError::Incomplete)) => {
                            eprintln!("  {}", OtpError::Incomplete.to_string().yellow());
                        }
                        Err(WorkflowError::Otp(e)) => eprintln!("  {}", e.to_string().red()),
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    fn show_demo_code(&self, dialog: &OtpDialog) {
        if let Some(code) = self.demo.as_ref().and_then(|d| d.issued_otp(dialog.patient_id())) {
            println!("  {} {}", "Offline backend issued code:".dimmed(), code.bold());
        }
    }

    async fn prescribe(&self, workflow: &mut RecordAccessWorkflow) -> Result<()> {
        render::section("NEW PRESCRIPTION");
        loop {
            let input = PrescriptionInput {
                medication: prompt::required("Medication")?,
                dosage: prompt::required("Dosage")?,
                frequency: prompt::required("Frequency")?,
                duration_days: prompt::required("Duration (days)")?.trim().parse().unwrap_or(0),
                notes: prompt::optional("Notes")?,
            };
            match workflow.add_prescription(&input).await {
                Ok(created) => {
                    render::notifications(workflow.take_notifications());
                    debug!("Prescription {:?} created", created.id);
                    render::tab(
                        &match workflow.record_view(today()) {
                            Some(RecordView::Full(full)) => full.render_tab(RecordTab::Prescriptions),
                            _ => bail!("record is no longer disclosed"),
                        },
                    );
                    return Ok(());
                }
                Err(WorkflowError::Validation(result)) => render::field_errors(&result),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Lookup for each decoded line a keyboard-wedge scanner types
    pub async fn scan_stream(&self) -> Result<()> {
        let mut workflow = self.workflow(CardNumberPolicy::Staff);
        let mut scanner = QrScanner::new(KeyboardWedge, SilentFeedback, MemoryDeviceStore::default());
        println!("{}", "  Waiting for scans (Ctrl-D to stop)".dimmed());
        loop {
            if !matches!(scanner.state(), ScanState::Ready { .. }) {
                scanner.open().await?;
            }
            let Some(line) = prompt::line("scan")? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            let Some(result) = workflow.submit_decoded(&mut scanner, &line).await else {
                continue;
            };
            match result {
                Ok(LookupOutcome::Found { .. }) => {
                    render::notifications(workflow.take_notifications());
                    if let Some(view) = workflow.record_view(today()) {
                        render::summary(&view.summary());
                    }
                }
                Ok(LookupOutcome::NotFound { card_number }) => {
                    render::notifications(workflow.take_notifications());
                    println!("  Run `portal-desk lookup {}` to register this patient.", card_number);
                    workflow.reset();
                }
                Err(WorkflowError::Validation(result)) => render::field_errors(&result),
                Err(_) => render::notifications(workflow.take_notifications()),
            }
        }
        scanner.close().await;
        Ok(())
    }

    pub async fn register(&self) -> Result<()> {
        render::section("PATIENT SELF-REGISTRATION");
        let mut form = PatientForm::for_self_registration();
        form.set_card_number(&prompt::required(&format!(
            "Card number (e.g. {})",
            CardNumberPolicy::SelfService.example()
        ))?);
        fill_form(&mut form, None)?;
        form.password = prompt::optional("Password")?;
        form.confirm_password = prompt::optional("Confirm password")?;

        loop {
            let result = form.validate(today());
            if result.is_valid() {
                break;
            }
            render::field_errors(&result);
            let fields: Vec<String> = result.fields().into_iter().map(str::to_string).collect();
            if fields.iter().any(|f| f == "card_number") {
                form.set_card_number(&prompt::required("Card number")?);
            }
            if fields.iter().any(|f| f == "password" || f == "confirm_password") {
                form.password = prompt::optional("Password")?;
                form.confirm_password = prompt::optional("Confirm password")?;
            }
            fill_form(&mut form, Some(&fields))?;
        }

        let created = self.api.create_patient(&form.to_new_patient()).await?;
        println!(
            "{} Registered {} with card number {}",
            "✓".green().bold(),
            created.full_name(),
            created.card_number.bold()
        );
        Ok(())
    }

    pub async fn audit(&self, query: AuditLogQuery) -> Result<()> {
        let check = query.validate();
        if !check.is_valid() {
            render::field_errors(&check);
            bail!("invalid audit query");
        }
        let page = self.api.audit_logs(&query).await?;
        render::audit_page(&page);
        Ok(())
    }

    pub async fn access_logs(&self, query: AccessLogQuery) -> Result<()> {
        let entries = self.api.access_logs(&query).await?;
        render::access_logs(&entries);
        Ok(())
    }

    pub async fn providers(&self) -> Result<()> {
        let providers = self.api.list_providers().await?;
        render::providers(&providers);
        Ok(())
    }

    pub async fn slots(&self, provider_id: i64, date: Option<NaiveDate>) -> Result<()> {
        let slots = self.api.list_time_slots(provider_id, date.unwrap_or_else(today)).await?;
        render::slots(&slots);
        Ok(())
    }

    pub async fn book(
        &self,
        patient_id: i64,
        provider_id: i64,
        date: Option<NaiveDate>,
        slot_id: Option<i64>,
        reason: Option<String>,
    ) -> Result<()> {
        let date = date.unwrap_or_else(today);
        let slots = self.api.list_time_slots(provider_id, date).await?;

        let mut draft = BookingDraft::new(patient_id);
        draft.choose_provider(provider_id);
        draft.choose_date(date);
        draft.slot_id = match slot_id {
            Some(id) => Some(id),
            None => {
                let free = available_slots(&slots);
                if free.is_empty() {
                    bail!("no available slots for provider {} on {}", provider_id, date);
                }
                render::slots(&free.into_iter().cloned().collect::<Vec<_>>());
                Some(prompt::required("Slot id")?.trim().parse()?)
            }
        };
        draft.reason = match reason {
            Some(reason) => reason,
            None => prompt::required("Reason for visit")?,
        };

        match book_appointment(self.api.as_ref(), &draft, &slots).await {
            Ok(appointment) => {
                render::appointment(&appointment);
                Ok(())
            }
            Err(WorkflowError::Validation(result)) => {
                render::field_errors(&result);
                bail!("booking rejected")
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn submit(workflow: &mut RecordAccessWorkflow, card: &str) -> Result<LookupOutcome> {
    match workflow.submit_manual(card).await {
        Ok(outcome) => {
            render::notifications(workflow.take_notifications());
            Ok(outcome)
        }
        Err(WorkflowError::Validation(result)) => {
            render::field_errors(&result);
            bail!("invalid card number")
        }
        Err(e) => {
            render::notifications(workflow.take_notifications());
            Err(e.into())
        }
    }
}

/// Apply the seconds elapsed since `last` to the resend cooldown
fn catch_up(dialog: &mut OtpDialog, last: &mut Instant) {
    let elapsed = last.elapsed().as_secs();
    for _ in 0..elapsed {
        if dialog.tick() == 0 {
            break;
        }
    }
    if elapsed > 0 {
        *last = Instant::now();
    }
}

/// Prompt for the form fields; `only` restricts to fields that failed validation
fn fill_form(form: &mut PatientForm, only: Option<&[String]>) -> Result<()> {
    let wants = |field: &str| only.map_or(true, |fields| fields.iter().any(|f| f == field));

    if wants("first_name") {
        form.first_name = prompt::required("First name")?;
    }
    if wants("last_name") {
        form.last_name = prompt::required("Last name")?;
    }
    if wants("email") {
        form.email = prompt::required("Email")?;
    }
    if wants("phone") {
        form.phone = prompt::required("Phone")?;
    }
    if wants("date_of_birth") {
        form.date_of_birth = prompt::date("Date of birth")?;
    }
    if wants("address") {
        form.address = prompt::optional("Address")?;
    }
    if only.is_none() {
        form.gender = prompt::optional("Gender")?;
        form.blood_type = prompt::optional("Blood type")?;
        form.allergies = prompt::optional("Allergies")?;
        form.emergency_contact_name = prompt::optional("Emergency contact name")?;
        form.emergency_contact_phone = prompt::optional("Emergency contact phone")?;
    }
    Ok(())
}
