//! Record display models
//!
//! A successful lookup only yields a [`PatientSummary`]. A [`FullRecordView`]
//! can only be built inside this crate, and the workflow only builds one once
//! identity has been confirmed.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::model::{MedicalRecord, Patient};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum RecordTab {
    Overview,
    Medications,
    Prescriptions,
    TestResults,
    Vaccinations,
    Visits,
}

impl RecordTab {
    pub const ALL: [RecordTab; 6] = [
        RecordTab::Overview,
        RecordTab::Medications,
        RecordTab::Prescriptions,
        RecordTab::TestResults,
        RecordTab::Vaccinations,
        RecordTab::Visits,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            RecordTab::Overview => "Overview",
            RecordTab::Medications => "Medications",
            RecordTab::Prescriptions => "Prescriptions",
            RecordTab::TestResults => "Test Results",
            RecordTab::Vaccinations => "Vaccinations",
            RecordTab::Visits => "Visit History",
        }
    }
}

/// What staff see before identity is confirmed: enough to ask the patient
/// to confirm who they are, nothing clinical
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PatientSummary {
    pub patient_id: i64,
    pub card_number: String,
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub age: Option<u32>,
    pub gender: Option<String>,
}

impl PatientSummary {
    pub fn from_patient(patient: &Patient, today: NaiveDate) -> Self {
        Self {
            patient_id: patient.id,
            card_number: patient.card_number.clone(),
            full_name: patient.full_name(),
            date_of_birth: patient.date_of_birth,
            age: patient.date_of_birth.and_then(|dob| age_on(dob, today)),
            gender: patient.gender.clone(),
        }
    }

    pub fn from_record(record: &MedicalRecord, today: NaiveDate) -> Self {
        Self::from_patient(&record.patient, today)
    }
}

/// Whole years between `dob` and `today`; `None` for a future birth date
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> Option<u32> {
    if dob > today {
        return None;
    }
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// One tab rendered as a table
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TabView {
    pub tab: RecordTab,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl TabView {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Full tabbed record, only reachable after identity confirmation
#[derive(Clone, Debug)]
pub struct FullRecordView<'a> {
    record: &'a MedicalRecord,
    today: NaiveDate,
}

impl<'a> FullRecordView<'a> {
    pub(crate) fn new(record: &'a MedicalRecord, today: NaiveDate) -> Self {
        Self { record, today }
    }

    pub fn record(&self) -> &'a MedicalRecord {
        self.record
    }

    pub fn summary(&self) -> PatientSummary {
        PatientSummary::from_record(self.record, self.today)
    }

    pub fn tabs(&self) -> Vec<TabView> {
        RecordTab::ALL.iter().map(|tab| self.render_tab(*tab)).collect()
    }

    pub fn render_tab(&self, tab: RecordTab) -> TabView {
        let record = self.record;
        let (headers, rows) = match tab {
            RecordTab::Overview => (vec!["Field", "Value"], self.overview_rows()),
            RecordTab::Medications => (
                vec!["Medication", "Dosage", "Frequency", "Since", "Status"],
                record
                    .medications
                    .iter()
                    .map(|m| {
                        vec![
                            m.name.clone(),
                            opt(&m.dosage),
                            opt(&m.frequency),
                            opt_date(m.start_date),
                            if m.active { "Active" } else { "Stopped" }.to_string(),
                        ]
                    })
                    .collect(),
            ),
            RecordTab::Prescriptions => (
                vec!["Medication", "Dosage", "Frequency", "Days", "Prescribed by", "Notes"],
                record
                    .prescriptions
                    .iter()
                    .map(|p| {
                        vec![
                            p.medication.clone(),
                            p.dosage.clone(),
                            p.frequency.clone(),
                            p.duration_days.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
                            opt(&p.prescribed_by),
                            opt(&p.notes),
                        ]
                    })
                    .collect(),
            ),
            RecordTab::TestResults => (
                vec!["Test", "Result", "Reference", "Status", "Date"],
                record
                    .test_results
                    .iter()
                    .map(|t| {
                        let value = match &t.unit {
                            Some(unit) => format!("{} {}", t.result, unit),
                            None => t.result.clone(),
                        };
                        vec![
                            t.test_name.clone(),
                            value,
                            opt(&t.reference_range),
                            opt(&t.status),
                            opt_date(t.performed_at.map(|at| at.date_naive())),
                        ]
                    })
                    .collect(),
            ),
            RecordTab::Vaccinations => (
                vec!["Vaccine", "Dose", "Date", "Administered by"],
                record
                    .vaccinations
                    .iter()
                    .map(|v| vec![v.vaccine.clone(), opt(&v.dose), opt_date(v.administered_on), opt(&v.administered_by)])
                    .collect(),
            ),
            RecordTab::Visits => {
                let mut visits: Vec<_> = record.visit_history.iter().collect();
                visits.sort_by(|a, b| b.visit_date.cmp(&a.visit_date));
                (
                    vec!["Date", "Department", "Provider", "Reason", "Diagnosis"],
                    visits
                        .into_iter()
                        .map(|v| {
                            vec![
                                v.visit_date.to_string(),
                                opt(&v.department),
                                opt(&v.provider),
                                opt(&v.reason),
                                opt(&v.diagnosis),
                            ]
                        })
                        .collect(),
                )
            }
        };
        TabView { tab, headers, rows }
    }

    fn overview_rows(&self) -> Vec<Vec<String>> {
        let p = &self.record.patient;
        let summary = self.summary();
        let last_visit = self.record.visit_history.iter().map(|v| v.visit_date).max();
        let active_medications = self.record.medications.iter().filter(|m| m.active).count();

        [
            ("Name", summary.full_name),
            ("Card number", p.card_number.clone()),
            ("Date of birth", opt_date(p.date_of_birth)),
            ("Age", summary.age.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string())),
            ("Gender", opt(&p.gender)),
            ("Email", p.email.clone()),
            ("Phone", p.phone.clone()),
            ("Address", opt(&p.address)),
            ("Blood type", opt(&p.blood_type)),
            ("Allergies", opt(&p.allergies)),
            ("Chronic conditions", opt(&p.chronic_conditions)),
            ("Emergency contact", emergency_contact(p)),
            ("Active medications", active_medications.to_string()),
            ("Last visit", opt_date(last_visit)),
        ]
        .into_iter()
        .map(|(k, v)| vec![k.to_string(), v])
        .collect()
    }
}

fn emergency_contact(p: &Patient) -> String {
    match (&p.emergency_contact_name, &p.emergency_contact_phone) {
        (Some(name), Some(phone)) => format!("{} ({})", name, phone),
        (Some(name), None) => name.clone(),
        (None, Some(phone)) => phone.clone(),
        (None, None) => "-".to_string(),
    }
}

fn opt(value: &Option<String>) -> String {
    value.clone().filter(|v| !v.is_empty()).unwrap_or_else(|| "-".to_string())
}

fn opt_date(value: Option<NaiveDate>) -> String {
    value.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}

/// What the workflow hands to a front end for the loaded record
#[derive(Clone, Debug)]
pub enum RecordView<'a> {
    Summary(PatientSummary),
    Full(FullRecordView<'a>),
}

impl RecordView<'_> {
    pub fn is_full(&self) -> bool {
        matches!(self, RecordView::Full(_))
    }

    pub fn summary(&self) -> PatientSummary {
        match self {
            RecordView::Summary(summary) => summary.clone(),
            RecordView::Full(full) => full.summary(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Medication, Visit};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record() -> MedicalRecord {
        let patient = Patient {
            id: 1,
            card_number: "ABC-2024-123".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Johnson".to_string(),
            email: "alice@example.com".to_string(),
            phone: "5550123456".to_string(),
            address: None,
            date_of_birth: Some(date(1990, 6, 16)),
            gender: Some("FEMALE".to_string()),
            blood_type: Some("A+".to_string()),
            allergies: Some("Penicillin".to_string()),
            chronic_conditions: None,
            emergency_contact_name: Some("Bob".to_string()),
            emergency_contact_phone: None,
        };
        let mut record = MedicalRecord::empty(patient);
        record.medications.push(Medication {
            name: "Metformin".to_string(),
            dosage: Some("500mg".to_string()),
            frequency: Some("Twice daily".to_string()),
            start_date: None,
            end_date: None,
            active: true,
        });
        for day in [3, 20, 11] {
            record.visit_history.push(Visit {
                visit_date: date(2024, 2, day),
                department: Some("Cardiology".to_string()),
                provider: None,
                reason: None,
                diagnosis: None,
                notes: None,
            });
        }
        record
    }

    #[test]
    fn test_age_on() {
        assert_eq!(age_on(date(1990, 6, 16), date(2024, 6, 15)), Some(33));
        assert_eq!(age_on(date(1990, 6, 15), date(2024, 6, 15)), Some(34));
        assert_eq!(age_on(date(2025, 1, 1), date(2024, 6, 15)), None);
    }

    #[test]
    fn test_summary_has_no_clinical_fields() {
        let summary = PatientSummary::from_record(&record(), date(2024, 6, 15));
        assert_eq!(summary.full_name, "Alice Johnson");
        assert_eq!(summary.age, Some(33));
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("blood_type").is_none());
        assert!(json.get("allergies").is_none());
    }

    #[test]
    fn test_full_view_tabs() {
        let record = record();
        let view = FullRecordView::new(&record, date(2024, 6, 15));
        let tabs = view.tabs();
        assert_eq!(tabs.len(), RecordTab::ALL.len());

        let overview = view.render_tab(RecordTab::Overview);
        assert!(overview.rows.contains(&vec!["Allergies".to_string(), "Penicillin".to_string()]));
        assert!(overview.rows.contains(&vec!["Last visit".to_string(), "2024-02-20".to_string()]));
        assert!(overview.rows.contains(&vec!["Emergency contact".to_string(), "Bob".to_string()]));

        let visits = view.render_tab(RecordTab::Visits);
        assert_eq!(visits.rows[0][0], "2024-02-20");
        assert_eq!(visits.rows[2][0], "2024-02-03");

        assert!(view.render_tab(RecordTab::Vaccinations).is_empty());
        assert_eq!(view.render_tab(RecordTab::Medications).rows[0][4], "Active");
    }
}
