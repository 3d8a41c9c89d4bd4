//! Integration tests for the record access workflow
//!
//! Lookup, identity confirmation, recovery and cancellation driven end to
//! end against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use hospital_portal_core::error::{ApiError, OtpError};
use hospital_portal_core::memory::InMemoryApi;
use hospital_portal_core::otp::{OTP_FALLBACK_MESSAGE, RESEND_COOLDOWN_SECS};
use hospital_portal_core::records::{RecordTab, RecordView};
use hospital_portal_core::workflow::IdentityConfirmation;
use hospital_portal_core::{CardNumberPolicy, LookupOutcome, RecordAccessWorkflow, WorkflowError, WorkflowState};
use proptest::prelude::*;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

fn desk() -> (Arc<InMemoryApi>, RecordAccessWorkflow) {
    let api = Arc::new(InMemoryApi::with_demo_data());
    let workflow = RecordAccessWorkflow::new(api.clone(), "nurse.joy");
    (api, workflow)
}

// =============================================================================
// Lookup and disclosure
// =============================================================================

mod lookup {
    use super::*;

    /// Scan -> summary only -> OTP -> full tabbed record
    #[tokio::test]
    async fn test_scan_then_otp_discloses_full_record() {
        let (api, mut workflow) = desk();

        let outcome = workflow.submit_scan("ABC-2024-123\n").await.unwrap();
        assert_eq!(outcome, LookupOutcome::Found { patient_id: 1 });
        assert_eq!(api.calls("scan_medical_record"), 1);

        match workflow.record_view(today()).unwrap() {
            RecordView::Summary(summary) => assert_eq!(summary.full_name, "Alice Johnson"),
            RecordView::Full(_) => panic!("full record shown before identity confirmation"),
        }

        let mut dialog = workflow.request_otp().await.unwrap();
        assert!(!dialog.can_verify());
        let code = api.issued_otp(1).expect("code issued");
        assert_eq!(dialog.entry_mut().paste(&code), 6);
        assert_eq!(dialog.entry().focus(), 5);
        assert!(dialog.can_verify());

        workflow.confirm_with_otp(&mut dialog, "Front desk lookup").await.unwrap();
        assert_eq!(
            workflow.confirmation(),
            Some(&IdentityConfirmation::Otp { staff_username: "nurse.joy".to_string() })
        );

        let view = workflow.record_view(today()).unwrap();
        let RecordView::Full(full) = view else {
            panic!("expected the full record after verification");
        };
        let medications = full.render_tab(RecordTab::Medications);
        assert_eq!(medications.rows[0][0], "Metformin");
        assert_eq!(full.tabs().len(), RecordTab::ALL.len());

        let access = api.recorded_access();
        assert_eq!(access.len(), 1);
        assert_eq!(access[0].patient_id, 1);
    }

    /// Malformed input fails locally
    #[tokio::test]
    async fn test_malformed_card_makes_no_call() {
        let (api, mut workflow) = desk();

        let err = workflow.submit_manual("xyz").await.unwrap_err();
        match err {
            WorkflowError::Validation(result) => assert!(result.has_error("card_number")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(api.total_calls(), 0);
        assert_eq!(workflow.state(), &WorkflowState::Idle);
    }

    #[tokio::test]
    async fn test_non_ascii_digits_make_no_call() {
        let (api, mut workflow) = desk();

        let arabic_digits = "ABC-\u{662}\u{660}\u{662}\u{664}-\u{661}\u{662}\u{663}";
        assert!(matches!(
            workflow.submit_manual(arabic_digits).await,
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            workflow.submit_scan("ABC-2024-\u{ff11}\u{ff12}\u{ff13}").await,
            Err(WorkflowError::Validation(_))
        ));
        assert_eq!(api.total_calls(), 0);
    }

    /// A search rejected by format is not a new search: a confirmed record stays confirmed
    #[tokio::test]
    async fn test_rejected_input_keeps_confirmed_record() {
        let (api, mut workflow) = desk();
        workflow.submit_manual("ABC-2024-123").await.unwrap();
        workflow.confirm_by_staff("Consultation").await.unwrap();
        let before = workflow.state().clone();

        assert!(workflow.submit_manual("xyz").await.is_err());
        assert_eq!(workflow.state(), &before);
        assert!(workflow.record_view(today()).unwrap().is_full());
        assert_eq!(api.calls("scan_medical_record"), 1);

        // A search that reaches the backend resets confirmation
        workflow.submit_manual("HOSP-2024-042").await.unwrap();
        assert_eq!(workflow.confirmation(), Some(&IdentityConfirmation::Unconfirmed));
    }

    #[tokio::test]
    async fn test_self_service_policy_accepts_short_prefix() {
        let api = Arc::new(InMemoryApi::with_demo_data());
        let mut staff = RecordAccessWorkflow::new(api.clone(), "nurse.joy");
        assert!(staff.submit_manual("P-2024-123").await.is_err());
        assert_eq!(api.total_calls(), 0);

        let mut kiosk = RecordAccessWorkflow::new(api.clone(), "kiosk").with_policy(CardNumberPolicy::SelfService);
        let outcome = kiosk.submit_manual("P-2024-123").await.unwrap();
        assert!(matches!(outcome, LookupOutcome::NotFound { .. }));
        assert_eq!(api.calls("scan_medical_record"), 1);
    }

    #[tokio::test]
    async fn test_wrong_code_keeps_summary() {
        let (api, mut workflow) = desk();
        workflow.submit_manual("ABC-2024-123").await.unwrap();
        let mut dialog = workflow.request_otp().await.unwrap();

        let issued = api.issued_otp(1).unwrap();
        let wrong: String = issued.chars().map(|c| if c == '9' { '0' } else { '9' }).collect();
        dialog.entry_mut().paste(&wrong);

        let err = workflow.confirm_with_otp(&mut dialog, "Front desk lookup").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Otp(OtpError::Rejected(_))));
        assert!(dialog.entry().cells().iter().all(Option::is_none));
        assert_eq!(dialog.entry().focus(), 0);
        assert!(dialog.error().is_some());
        assert!(!workflow.record_view(today()).unwrap().is_full());
        assert!(api.recorded_access().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_uses_fallback_message() {
        let (api, mut workflow) = desk();
        workflow.submit_manual("ABC-2024-123").await.unwrap();
        let mut dialog = workflow.request_otp().await.unwrap();
        dialog.entry_mut().paste("123456");

        api.fail_next("verify_otp", ApiError::Network("connection refused".to_string()));
        let err = workflow.confirm_with_otp(&mut dialog, "Front desk lookup").await.unwrap_err();
        assert_eq!(err, WorkflowError::Otp(OtpError::Rejected(OTP_FALLBACK_MESSAGE.to_string())));
    }

    #[tokio::test]
    async fn test_incomplete_code_is_not_sent() {
        let (api, mut workflow) = desk();
        workflow.submit_manual("ABC-2024-123").await.unwrap();
        let mut dialog = workflow.request_otp().await.unwrap();
        dialog.entry_mut().paste("123");

        let err = workflow.confirm_with_otp(&mut dialog, "Front desk lookup").await.unwrap_err();
        assert_eq!(err, WorkflowError::Otp(OtpError::Incomplete));
        assert_eq!(api.calls("verify_otp"), 0);
    }
}

// =============================================================================
// Not-found recovery
// =============================================================================

mod recovery {
    use super::*;

    #[tokio::test]
    async fn test_not_found_opens_locked_form_and_relooks_up() {
        let (api, mut workflow) = desk();

        let outcome = workflow.submit_manual("ABCD-2024-999").await.unwrap();
        assert!(matches!(outcome, LookupOutcome::NotFound { ref card_number } if card_number.as_str() == "ABCD-2024-999"));

        let form = workflow.recovery_form_mut().expect("creation form open");
        assert_eq!(form.card_number(), "ABCD-2024-999");
        assert!(form.is_card_locked());
        assert!(!form.set_card_number("ABC-2024-000"));

        // Invalid form: no call
        let err = workflow.submit_recovery(today()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(api.calls("create_patient"), 0);

        let form = workflow.recovery_form_mut().unwrap();
        form.first_name = "Dana".to_string();
        form.last_name = "Scully".to_string();
        form.email = "dana.scully@example.com".to_string();
        form.phone = "555-013-2222".to_string();
        form.date_of_birth = NaiveDate::from_ymd_opt(1964, 2, 23);
        form.password = Some("trustno1!".to_string());
        form.confirm_password = Some("trustno1!".to_string());

        let outcome = workflow.submit_recovery(today()).await.unwrap();
        assert!(matches!(outcome, LookupOutcome::Found { .. }));
        assert_eq!(api.calls("create_patient"), 1);
        assert_eq!(api.calls("scan_medical_record"), 2);

        let patient = workflow.loaded_patient().unwrap();
        assert_eq!(patient.card_number, "ABCD-2024-999");
        assert_eq!(patient.first_name, "Dana");
        assert_eq!(workflow.confirmation(), Some(&IdentityConfirmation::Unconfirmed));
    }

    #[tokio::test]
    async fn test_create_failure_keeps_form() {
        let (api, mut workflow) = desk();
        workflow.submit_manual("ABCD-2024-999").await.unwrap();
        let form = workflow.recovery_form_mut().unwrap();
        form.first_name = "Dana".to_string();
        form.last_name = "Scully".to_string();
        form.email = "dana.scully@example.com".to_string();
        form.phone = "5550132222".to_string();
        form.date_of_birth = NaiveDate::from_ymd_opt(1964, 2, 23);

        api.fail_next("create_patient", ApiError::Status { status: 503, message: String::new() });
        assert!(workflow.submit_recovery(today()).await.is_err());
        assert_eq!(workflow.recovery_form().unwrap().first_name, "Dana");

        workflow.submit_recovery(today()).await.unwrap();
        assert!(workflow.loaded_record().is_some());
    }

    #[tokio::test]
    async fn test_not_found_classification() {
        for message in ["Patient not found", "HTTP 404", "No patient with this card", "NOT FOUND"] {
            let (api, mut workflow) = desk();
            api.fail_next("scan_medical_record", ApiError::from_status(500, message));
            let outcome = workflow.submit_manual("ABC-2024-123").await.unwrap();
            assert!(matches!(outcome, LookupOutcome::NotFound { .. }), "{}", message);
            assert_eq!(workflow.recovery_form().unwrap().card_number(), "ABC-2024-123");
        }

        for error in [
            ApiError::from_status(500, "Internal server error"),
            ApiError::from_status(403, "Forbidden"),
            ApiError::Timeout("30s elapsed".to_string()),
        ] {
            let (api, mut workflow) = desk();
            api.fail_next("scan_medical_record", error.clone());
            assert!(workflow.submit_manual("ABC-2024-123").await.is_err(), "{:?}", error);
            assert!(workflow.recovery_form().is_none(), "{:?}", error);
        }
    }
}

// =============================================================================
// Cancellation and cooldown (paused clock)
// =============================================================================

mod timing {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_lookup_leaves_state_unchanged() {
        let api = Arc::new(InMemoryApi::with_demo_data().with_latency(Duration::from_secs(5)));
        let mut workflow = RecordAccessWorkflow::new(api.clone(), "nurse.joy");
        workflow.submit_manual("ABC-2024-123").await.unwrap();
        workflow.confirm_by_staff("Consultation").await.unwrap();
        let before = workflow.state().clone();

        let canceller = workflow.canceller();
        let (result, cancelled) = tokio::join!(workflow.submit_manual("ABCD-2024-999"), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel()
        });

        assert!(cancelled);
        assert_eq!(result, Err(WorkflowError::Cancelled));
        assert_eq!(workflow.state(), &before);
        assert_eq!(api.calls("scan_medical_record"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_cooldown() {
        let (api, mut workflow) = desk();
        workflow.submit_manual("ABC-2024-123").await.unwrap();
        let mut dialog = workflow.request_otp().await.unwrap();

        assert_eq!(dialog.cooldown().remaining(), RESEND_COOLDOWN_SECS);
        assert!(!dialog.can_resend());
        assert_eq!(
            dialog.resend(workflow.api()).await,
            Err(OtpError::CooldownActive(RESEND_COOLDOWN_SECS))
        );
        assert_eq!(api.calls("send_otp"), 1);

        let mut seen = Vec::new();
        dialog.cooldown_mut().run(|remaining| seen.push(remaining)).await;
        assert_eq!(seen.len(), RESEND_COOLDOWN_SECS as usize);
        assert_eq!(seen.first(), Some(&(RESEND_COOLDOWN_SECS - 1)));
        assert_eq!(seen.last(), Some(&0));
        assert!(dialog.can_resend());

        // A failed resend does not start the cooldown
        api.fail_next("send_otp", ApiError::Network("offline".to_string()));
        assert!(matches!(dialog.resend(workflow.api()).await, Err(OtpError::SendFailed(_))));
        assert!(dialog.can_resend());

        dialog.entry_mut().paste("12");
        dialog.resend(workflow.api()).await.unwrap();
        assert!(dialog.entry().cells().iter().all(Option::is_none));
        assert_eq!(dialog.cooldown().remaining(), RESEND_COOLDOWN_SECS);
        assert_eq!(api.calls("send_otp"), 3);
    }
}

// =============================================================================
// QR scanner into lookup
// =============================================================================

mod scanning {
    use super::*;
    use async_trait::async_trait;
    use hospital_portal_core::scanner::{
        CameraBackend, CameraDevice, MemoryDeviceStore, QrScanner, ScanState, SilentFeedback, StreamCapabilities,
    };
    use hospital_portal_core::ScanError;

    #[derive(Default)]
    struct RearCamera {
        streaming: bool,
        starts: usize,
        stops: usize,
    }

    #[async_trait]
    impl CameraBackend for RearCamera {
        async fn enumerate_devices(&mut self) -> Result<Vec<CameraDevice>, ScanError> {
            Ok(vec![CameraDevice {
                id: "cam-1".to_string(),
                label: "Rear camera".to_string(),
            }])
        }

        async fn start_stream(&mut self, _device_id: &str) -> Result<StreamCapabilities, ScanError> {
            self.streaming = true;
            self.starts += 1;
            Ok(StreamCapabilities::default())
        }

        async fn stop_stream(&mut self) {
            self.streaming = false;
            self.stops += 1;
        }

        async fn set_torch(&mut self, _on: bool) -> Result<(), ScanError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_repeated_decodes_trigger_one_lookup() {
        let (api, mut workflow) = desk();
        let mut scanner = QrScanner::new(RearCamera::default(), SilentFeedback, MemoryDeviceStore::default());
        scanner.open().await.unwrap();

        let first = workflow.submit_decoded(&mut scanner, "ABC-2024-123").await;
        assert_eq!(first, Some(Ok(LookupOutcome::Found { patient_id: 1 })));
        assert!(!scanner.camera().streaming);
        assert_eq!(scanner.camera().stops, 1);

        // The decoder keeps firing on the same frame
        assert_eq!(workflow.submit_decoded(&mut scanner, "ABC-2024-123").await, None);
        assert_eq!(workflow.submit_decoded(&mut scanner, "HOSP-2024-042").await, None);

        assert_eq!(api.calls("scan_medical_record"), 1);
        assert_eq!(api.total_calls(), 1);
        assert_eq!(scanner.state(), &ScanState::Decoded("ABC-2024-123".to_string()));
        assert_eq!(workflow.loaded_patient().map(|p| p.id), Some(1));
    }

    #[tokio::test]
    async fn test_reopened_scanner_decodes_again() {
        let (api, mut workflow) = desk();
        let mut scanner = QrScanner::new(RearCamera::default(), SilentFeedback, MemoryDeviceStore::default());

        scanner.open().await.unwrap();
        workflow.submit_decoded(&mut scanner, "ABC-2024-123").await.unwrap().unwrap();
        scanner.open().await.unwrap();
        let second = workflow.submit_decoded(&mut scanner, "HOSP-2024-042\n").await;

        assert_eq!(second, Some(Ok(LookupOutcome::Found { patient_id: 2 })));
        assert_eq!(api.calls("scan_medical_record"), 2);
        assert_eq!(scanner.camera().starts, 2);
    }

    #[tokio::test]
    async fn test_closed_scanner_makes_no_call() {
        let (api, mut workflow) = desk();
        let mut scanner = QrScanner::new(RearCamera::default(), SilentFeedback, MemoryDeviceStore::default());

        assert_eq!(workflow.submit_decoded(&mut scanner, "ABC-2024-123").await, None);
        scanner.open().await.unwrap();
        scanner.close().await;
        assert_eq!(workflow.submit_decoded(&mut scanner, "ABC-2024-123").await, None);
        assert_eq!(api.total_calls(), 0);
    }
}

// =============================================================================
// Properties
// =============================================================================

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_valid_card_triggers_exactly_one_lookup(card in "[A-Z]{3,4}-[0-9]{4}-[0-9]{3,6}") {
        let (api, mut workflow) = desk();
        let outcome = runtime().block_on(workflow.submit_manual(&card));
        prop_assert!(outcome.is_ok());
        prop_assert_eq!(api.calls("scan_medical_record"), 1);
        prop_assert_eq!(api.total_calls(), 1);
    }

    #[test]
    fn prop_unicode_digit_serial_makes_no_call(prefix in "[A-Z]{3,4}", serial in "[\u{660}-\u{669}\u{ff10}-\u{ff19}]{3,6}") {
        let (api, mut workflow) = desk();
        let outcome = runtime().block_on(workflow.submit_manual(&format!("{}-2024-{}", prefix, serial)));
        prop_assert!(matches!(outcome, Err(WorkflowError::Validation(_))));
        prop_assert_eq!(api.total_calls(), 0);
    }

    #[test]
    fn prop_invalid_card_makes_no_call(input in "\\PC{0,20}") {
        prop_assume!(!CardNumberPolicy::Staff.matches(input.trim()));
        let (api, mut workflow) = desk();
        let outcome = runtime().block_on(workflow.submit_manual(&input));
        prop_assert!(matches!(outcome, Err(WorkflowError::Validation(_))));
        prop_assert_eq!(api.total_calls(), 0);
    }
}
