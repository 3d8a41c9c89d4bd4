//! Identity confirmation dialog
//!
//! Six single-digit cells behave as one code. The dialog verifies the code
//! against the backend on behalf of a staff member and rate-limits resends
//! with a 60 second client-side cooldown.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::HospitalApi;
use crate::error::{OtpError, GENERIC_API_FAILURE};
use crate::model::{OtpSendRequest, OtpVerifyRequest};

pub const OTP_LENGTH: usize = 6;
pub const RESEND_COOLDOWN_SECS: u32 = 60;
pub const OTP_FALLBACK_MESSAGE: &str = "Invalid verification code. Please try again.";

/// The six code cells and which one has focus
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OtpEntry {
    cells: [Option<char>; OTP_LENGTH],
    focus: usize,
}

impl OtpEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cells(&self) -> &[Option<char>; OTP_LENGTH] {
        &self.cells
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    /// Move focus, e.g. when a cell is clicked
    pub fn focus_cell(&mut self, index: usize) {
        if index < OTP_LENGTH {
            self.focus = index;
        }
    }

    /// Type a character into `index`; returns false (and changes nothing) for non-digits
    pub fn input(&mut self, index: usize, ch: char) -> bool {
        if index >= OTP_LENGTH || !ch.is_ascii_digit() {
            return false;
        }
        self.cells[index] = Some(ch);
        self.focus = (index + 1).min(OTP_LENGTH - 1);
        true
    }

    /// Backspace in `index`: clears a filled cell, or retreats focus from an empty one
    pub fn backspace(&mut self, index: usize) -> bool {
        if index >= OTP_LENGTH {
            return false;
        }
        if self.cells[index].is_some() {
            self.cells[index] = None;
            self.focus = index;
            true
        } else if index > 0 {
            self.focus = index - 1;
            true
        } else {
            false
        }
    }

    /// Distribute up to six pasted digits from the first cell onward
    ///
    /// Non-digit characters in the clipboard are skipped. Focus lands on the
    /// last cell that received a digit. Returns the number of digits placed.
    pub fn paste(&mut self, text: &str) -> usize {
        let digits: Vec<char> = text.chars().filter(|c| c.is_ascii_digit()).take(OTP_LENGTH).collect();
        if digits.is_empty() {
            return 0;
        }
        for (cell, digit) in self.cells.iter_mut().zip(digits.iter()) {
            *cell = Some(*digit);
        }
        self.focus = digits.len() - 1;
        digits.len()
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// The six-digit code, only once every cell is filled
    pub fn code(&self) -> Option<String> {
        self.cells.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.cells = [None; OTP_LENGTH];
        self.focus = 0;
    }
}

/// Countdown that keeps the resend control disabled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResendCooldown {
    remaining: u32,
}

impl ResendCooldown {
    pub fn start(&mut self) {
        self.remaining = RESEND_COOLDOWN_SECS;
    }

    /// One second elapsed; returns the seconds left
    pub fn tick(&mut self) -> u32 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_active(&self) -> bool {
        self.remaining > 0
    }

    /// Tick once per second until the cooldown expires, reporting each value
    pub async fn run(&mut self, mut on_tick: impl FnMut(u32)) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        // The first tick of an interval completes immediately
        interval.tick().await;
        while self.is_active() {
            interval.tick().await;
            on_tick(self.tick());
        }
    }
}

/// Verification dialog state for one patient
#[derive(Clone, Debug)]
pub struct OtpDialog {
    patient_id: i64,
    staff_username: String,
    entry: OtpEntry,
    cooldown: ResendCooldown,
    error: Option<String>,
}

impl OtpDialog {
    pub fn new(patient_id: i64, staff_username: impl Into<String>) -> Self {
        Self {
            patient_id,
            staff_username: staff_username.into(),
            entry: OtpEntry::new(),
            cooldown: ResendCooldown::default(),
            error: None,
        }
    }

    pub fn patient_id(&self) -> i64 {
        self.patient_id
    }

    pub fn entry(&self) -> &OtpEntry {
        &self.entry
    }

    pub fn entry_mut(&mut self) -> &mut OtpEntry {
        &mut self.entry
    }

    pub fn cooldown(&self) -> &ResendCooldown {
        &self.cooldown
    }

    pub fn cooldown_mut(&mut self) -> &mut ResendCooldown {
        &mut self.cooldown
    }

    /// Message currently shown in the dialog
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn can_verify(&self) -> bool {
        self.entry.is_complete()
    }

    pub fn can_resend(&self) -> bool {
        !self.cooldown.is_active()
    }

    /// Advance the resend countdown by one second
    pub fn tick(&mut self) -> u32 {
        self.cooldown.tick()
    }

    /// Ask the backend to deliver a code to the patient
    ///
    /// Clears whatever was typed. The cooldown starts only after the backend
    /// accepted the request.
    pub async fn send_code(&mut self, api: &dyn HospitalApi) -> Result<(), OtpError> {
        if self.cooldown.is_active() {
            return Err(OtpError::CooldownActive(self.cooldown.remaining()));
        }
        self.entry.clear();

        let request = OtpSendRequest {
            patient_id: self.patient_id,
            staff_username: self.staff_username.clone(),
        };
        match api.send_otp(&request).await {
            Ok(()) => {
                info!("Verification code sent for patient {}", self.patient_id);
                self.error = None;
                self.cooldown.start();
                Ok(())
            }
            Err(e) => {
                warn!("Failed to send verification code for patient {}: {}", self.patient_id, e);
                let message = e.user_message();
                self.error = Some(message.clone());
                Err(OtpError::SendFailed(message))
            }
        }
    }

    /// Resend control
    pub async fn resend(&mut self, api: &dyn HospitalApi) -> Result<(), OtpError> {
        self.send_code(api).await
    }

    /// Verify the entered code
    ///
    /// An incomplete code fails without a network call. A rejected code
    /// clears every cell and returns focus to the first one.
    pub async fn verify(&mut self, api: &dyn HospitalApi) -> Result<(), OtpError> {
        let Some(code) = self.entry.code() else {
            self.error = Some(OtpError::Incomplete.to_string());
            return Err(OtpError::Incomplete);
        };

        let request = OtpVerifyRequest {
            patient_id: self.patient_id,
            otp_code: code,
            staff_username: self.staff_username.clone(),
        };

        let message = match api.verify_otp(&request).await {
            Ok(response) if response.success => {
                debug!("Verification code accepted for patient {}", self.patient_id);
                self.error = None;
                return Ok(());
            }
            Ok(response) => response
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| OTP_FALLBACK_MESSAGE.to_string()),
            Err(e) => {
                warn!("Verification request failed for patient {}: {}", self.patient_id, e);
                let message = e.user_message();
                if message == GENERIC_API_FAILURE {
                    OTP_FALLBACK_MESSAGE.to_string()
                } else {
                    message
                }
            }
        };

        self.entry.clear();
        self.error = Some(message.clone());
        Err(OtpError::Rejected(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::memory::InMemoryApi;
    use proptest::prelude::*;

    fn filled(code: &str) -> OtpEntry {
        let mut entry = OtpEntry::new();
        for (i, ch) in code.chars().enumerate() {
            entry.input(i, ch);
        }
        entry
    }

    #[test]
    fn test_input_advances_focus() {
        let mut entry = OtpEntry::new();
        assert!(entry.input(0, '4'));
        assert_eq!(entry.focus(), 1);
        assert!(entry.input(1, '2'));
        assert_eq!(entry.focus(), 2);

        // Focus stays on the last cell
        assert!(entry.input(5, '9'));
        assert_eq!(entry.focus(), 5);
    }

    #[test]
    fn test_non_digit_input_is_noop() {
        let mut entry = filled("12");
        let before = entry.clone();
        assert!(!entry.input(2, 'a'));
        assert!(!entry.input(2, ' '));
        assert!(!entry.input(9, '1'));
        assert_eq!(entry, before);
    }

    #[test]
    fn test_backspace() {
        let mut entry = filled("123");
        entry.focus_cell(3);

        // Empty cell: focus retreats, nothing cleared
        assert!(entry.backspace(3));
        assert_eq!(entry.focus(), 2);
        assert_eq!(entry.cells()[2], Some('3'));

        // Filled cell: cleared, focus stays
        assert!(entry.backspace(2));
        assert_eq!(entry.cells()[2], None);
        assert_eq!(entry.focus(), 2);

        let mut empty = OtpEntry::new();
        assert!(!empty.backspace(0));
    }

    #[test]
    fn test_paste_full_code() {
        let mut entry = OtpEntry::new();
        entry.focus_cell(3);
        assert_eq!(entry.paste("482913"), 6);
        assert_eq!(entry.code().as_deref(), Some("482913"));
        assert_eq!(entry.focus(), 5);
    }

    #[test]
    fn test_paste_partial_and_noisy() {
        let mut entry = OtpEntry::new();
        assert_eq!(entry.paste("12-3"), 3);
        assert_eq!(entry.cells()[..3], [Some('1'), Some('2'), Some('3')]);
        assert_eq!(entry.focus(), 2);
        assert!(!entry.is_complete());

        // Extra digits are dropped
        assert_eq!(entry.paste("1234567890"), 6);
        assert_eq!(entry.code().as_deref(), Some("123456"));

        // Nothing usable
        let before = entry.clone();
        assert_eq!(entry.paste("abc"), 0);
        assert_eq!(entry, before);
    }

    #[test]
    fn test_cooldown_ticks_to_zero() {
        let mut cooldown = ResendCooldown::default();
        assert!(!cooldown.is_active());

        cooldown.start();
        assert_eq!(cooldown.remaining(), RESEND_COOLDOWN_SECS);
        for expected in (0..RESEND_COOLDOWN_SECS).rev() {
            assert!(cooldown.is_active());
            assert_eq!(cooldown.tick(), expected);
        }
        assert!(!cooldown.is_active());
        assert_eq!(cooldown.tick(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_runs_once_per_second() {
        let mut cooldown = ResendCooldown::default();
        cooldown.start();

        let started = tokio::time::Instant::now();
        let mut seen = Vec::new();
        cooldown.run(|remaining| seen.push(remaining)).await;

        assert_eq!(seen.len(), RESEND_COOLDOWN_SECS as usize);
        assert_eq!(seen.first(), Some(&59));
        assert_eq!(seen.last(), Some(&0));
        assert_eq!(started.elapsed(), Duration::from_secs(RESEND_COOLDOWN_SECS as u64));
    }

    #[tokio::test]
    async fn test_verify_failure_shows_server_message() {
        let api = InMemoryApi::with_demo_data();
        let mut dialog = OtpDialog::new(1, "nurse.joy");
        dialog.send_code(&api).await.unwrap();

        api.fail_next("verify_otp", ApiError::NotFound("Verification code not found".to_string()));
        dialog.entry_mut().paste("123456");
        let err = dialog.verify(&api).await.unwrap_err();
        assert_eq!(err, OtpError::Rejected("Verification code not found".to_string()));
        assert_eq!(dialog.error(), Some("Verification code not found"));
        assert!(dialog.entry().cells().iter().all(Option::is_none));
        assert_eq!(dialog.entry().focus(), 0);

        // Transport failures carry no server text
        api.fail_next("verify_otp", ApiError::Timeout("30s".to_string()));
        dialog.entry_mut().paste("123456");
        let err = dialog.verify(&api).await.unwrap_err();
        assert_eq!(err, OtpError::Rejected(OTP_FALLBACK_MESSAGE.to_string()));

        api.fail_next("verify_otp", ApiError::Status { status: 503, message: "Service Unavailable".to_string() });
        dialog.entry_mut().paste("123456");
        assert_eq!(dialog.verify(&api).await.unwrap_err(), OtpError::Rejected("Service Unavailable".to_string()));
    }

    proptest! {
        #[test]
        fn verify_enabled_only_with_six_digits(code in "[0-9]{0,6}") {
            let entry = filled(&code);
            prop_assert_eq!(entry.is_complete(), code.len() == OTP_LENGTH);
            prop_assert_eq!(entry.code().is_some(), code.len() == OTP_LENGTH);
        }

        #[test]
        fn non_digits_never_change_state(prefix in "[0-9]{0,5}", ch in "[^0-9]", index in 0usize..6) {
            let mut entry = filled(&prefix);
            let before = entry.clone();
            let ch = ch.chars().next().unwrap();
            prop_assert!(!entry.input(index, ch));
            prop_assert_eq!(entry, before);
        }

        #[test]
        fn pasting_six_digits_fills_every_cell(code in "[0-9]{6}", start in 0usize..6) {
            let mut entry = OtpEntry::new();
            entry.focus_cell(start);
            entry.paste(&code);
            prop_assert_eq!(entry.code(), Some(code));
            prop_assert_eq!(entry.focus(), OTP_LENGTH - 1);
        }
    }
}
