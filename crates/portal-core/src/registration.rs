//! Patient creation form
//!
//! One form type serves both the desk recovery path (card number locked to
//! the value that failed lookup) and self-registration.

use chrono::NaiveDate;
use hospital_portal_validation::{
    validate_address, validate_card_number, validate_date_of_birth, validate_email, validate_name,
    validate_password_confirmation, validate_phone, CardNumberPolicy, ValidationResult,
};
use serde::{Deserialize, Serialize};

use crate::card_number::{provisional_card_number, CardNumber};
use crate::model::NewPatient;

/// Where the card number on a form came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardNumberOrigin {
    /// Scanned or typed at the desk; locked
    Scanned,
    /// Generated because no number was supplied
    Provisional,
    /// Typed by the patient during self-registration
    Entered,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientForm {
    card_number: String,
    card_origin: CardNumberOrigin,
    policy: CardNumberPolicy,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

impl PatientForm {
    fn blank(card_number: String, card_origin: CardNumberOrigin, policy: CardNumberPolicy) -> Self {
        Self {
            card_number,
            card_origin,
            policy,
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: String::new(),
            address: None,
            date_of_birth: None,
            gender: None,
            blood_type: None,
            allergies: None,
            emergency_contact_name: None,
            emergency_contact_phone: None,
            password: None,
            confirm_password: None,
        }
    }

    /// Form opened after a lookup came back not-found
    pub fn for_recovery(card_number: Option<CardNumber>) -> Self {
        match card_number {
            Some(card) => Self::blank(card.to_string(), CardNumberOrigin::Scanned, CardNumberPolicy::Staff),
            None => Self::blank(
                provisional_card_number().to_string(),
                CardNumberOrigin::Provisional,
                CardNumberPolicy::Staff,
            ),
        }
    }

    pub fn for_self_registration() -> Self {
        Self::blank(String::new(), CardNumberOrigin::Entered, CardNumberPolicy::SelfService)
    }

    pub fn card_number(&self) -> &str {
        &self.card_number
    }

    pub fn card_origin(&self) -> CardNumberOrigin {
        self.card_origin
    }

    pub fn is_card_locked(&self) -> bool {
        self.card_origin != CardNumberOrigin::Entered
    }

    /// Edit the card number; ignored while it is locked
    pub fn set_card_number(&mut self, value: &str) -> bool {
        if self.is_card_locked() {
            return false;
        }
        self.card_number = value.trim().to_string();
        true
    }

    /// Field-level validation of the whole form
    pub fn validate(&self, today: NaiveDate) -> ValidationResult {
        let mut result = ValidationResult::new();
        // Locked numbers were validated on lookup or generated locally
        if !self.is_card_locked() {
            result.merge(validate_card_number(&self.card_number, self.policy));
        }
        result.merge(validate_name(&self.first_name, "first_name", "First name"));
        result.merge(validate_name(&self.last_name, "last_name", "Last name"));
        result.merge(validate_email(&self.email));
        result.merge(validate_phone(&self.phone));
        result.merge(validate_address(self.address.as_deref()));
        result.merge(validate_date_of_birth(self.date_of_birth, today));
        result.merge(validate_password_confirmation(
            self.password.as_deref(),
            self.confirm_password.as_deref(),
        ));
        result
    }

    /// Submission payload: every field as entered, minus the confirmation password
    pub fn to_new_patient(&self) -> NewPatient {
        NewPatient {
            card_number: self.card_number.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            date_of_birth: self.date_of_birth,
            gender: self.gender.clone(),
            blood_type: self.blood_type.clone(),
            allergies: self.allergies.clone(),
            emergency_contact_name: self.emergency_contact_name.clone(),
            emergency_contact_phone: self.emergency_contact_phone.clone(),
            password: self.password.clone(),
        }
    }
}
