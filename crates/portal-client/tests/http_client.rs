//! HTTP client against a scripted local server
//!
//! The server answers each connection with the next canned response and
//! records what it received.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use hospital_portal_client::{ApiConfig, HttpApiClient};
use hospital_portal_core::audit::AuditLogQuery;
use hospital_portal_core::model::{AuditAction, OtpVerifyRequest};
use hospital_portal_core::{ApiError, CardNumber, HospitalApi};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Clone, Debug)]
struct Recorded {
    method: String,
    target: String,
    body: String,
}

struct MockServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    async fn start(responses: Vec<(u16, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();

        tokio::spawn(async move {
            let mut responses = VecDeque::from(responses);
            while let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                log.lock().unwrap().push(request);
                let (status, body) = responses
                    .pop_front()
                    .unwrap_or((500, r#"{"message": "no scripted response left"}"#));
                let reply = format!(
                    "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{}/api", addr),
            requests,
        }
    }

    fn client(&self) -> HttpApiClient {
        let config = ApiConfig::default()
            .with_base_url(&self.base_url)
            .unwrap()
            .with_retry(3, Duration::from_millis(10));
        HttpApiClient::new(config).unwrap()
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }

    let text = String::from_utf8_lossy(&buf).to_string();
    let (head, body) = text.split_once("\r\n\r\n").unwrap_or((&text, ""));
    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    Recorded {
        method: request_line.next().unwrap_or_default().to_string(),
        target: request_line.next().unwrap_or_default().to_string(),
        body: body.to_string(),
    }
}

const RECORD_JSON: &str = r#"{
    "patient": {
        "id": 1, "cardNumber": "ABC-2024-123", "firstName": "Alice", "lastName": "Johnson",
        "email": "alice@example.com", "phone": "5550123456", "dateOfBirth": "1985-04-12"
    },
    "medications": [{"name": "Metformin", "dosage": "500mg", "active": true}],
    "visitHistory": [{"visitDate": "2024-05-01", "department": "Endocrinology"}]
}"#;

fn card(value: &str) -> CardNumber {
    CardNumber::from_backend(value)
}

#[tokio::test]
async fn test_scan_decodes_record() {
    let server = MockServer::start(vec![(200, RECORD_JSON)]).await;
    let record = server.client().scan_medical_record(&card("ABC-2024-123")).await.unwrap();

    assert_eq!(record.patient.full_name(), "Alice Johnson");
    assert_eq!(record.medications.len(), 1);
    assert_eq!(record.visit_history[0].visit_date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].target, "/api/medical-records/scan/ABC-2024-123");
}

#[tokio::test]
async fn test_404_is_not_found_and_not_retried() {
    let server = MockServer::start(vec![(404, r#"{"message": "Medical record not found"}"#)]).await;
    let err = server.client().scan_medical_record(&card("ABCD-2024-999")).await.unwrap_err();

    assert_eq!(err, ApiError::NotFound("Medical record not found".to_string()));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_not_found_message_on_server_error() {
    let server = MockServer::start(vec![(500, r#"{"error": "No patient with card ABCD-2024-999"}"#)]).await;
    let err = server.client().scan_medical_record(&card("ABCD-2024-999")).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start(vec![(503, ""), (502, "bad gateway"), (200, RECORD_JSON)]).await;
    let record = server.client().scan_medical_record(&card("ABC-2024-123")).await.unwrap();

    assert_eq!(record.patient.id, 1);
    assert_eq!(server.requests().len(), 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start(vec![(500, ""), (500, ""), (500, ""), (500, ""), (200, RECORD_JSON)]).await;
    let err = server.client().list_patients().await.unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 500, .. }));
    assert_eq!(err.user_message(), "Internal Server Error");
    assert_eq!(server.requests().len(), 4);
}

#[tokio::test]
async fn test_client_errors_are_rejections() {
    let server = MockServer::start(vec![(409, r#"{"message": "Card number already registered"}"#)]).await;
    let err = server.client().delete_patient(7).await.unwrap_err();

    assert_eq!(err, ApiError::Rejected("Card number already registered".to_string()));
    assert_eq!(server.requests()[0].method, "DELETE");
    assert_eq!(server.requests()[0].target, "/api/patients/7");
}

#[tokio::test]
async fn test_verify_otp_wire_format() {
    let server = MockServer::start(vec![(200, r#"{"success": false, "message": "Code expired"}"#)]).await;
    let request = OtpVerifyRequest {
        patient_id: 42,
        otp_code: "123456".to_string(),
        staff_username: "nurse.joy".to_string(),
    };
    let response = server.client().verify_otp(&request).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("Code expired"));

    let sent = &server.requests()[0];
    assert_eq!(sent.method, "POST");
    assert_eq!(sent.target, "/api/otp/verify");
    let body: serde_json::Value = serde_json::from_str(&sent.body).unwrap();
    assert_eq!(body["patientId"], 42);
    assert_eq!(body["otpCode"], "123456");
    assert_eq!(body["staffUsername"], "nurse.joy");
}

#[tokio::test]
async fn test_audit_query_string() {
    let page = r#"{"content": [], "currentPage": 1, "totalItems": 0, "totalPages": 0}"#;
    let server = MockServer::start(vec![(200, page)]).await;
    let query = AuditLogQuery::new().username("admin").action(AuditAction::ViewRecord).page(1, 50);

    let result = server.client().audit_logs(&query).await.unwrap();
    assert!(result.content.is_empty());
    assert!(!result.has_more());

    let target = &server.requests()[0].target;
    assert!(target.starts_with("/api/audit-logs?"), "{}", target);
    assert!(target.contains("username=admin"));
    assert!(target.contains("action=VIEW_RECORD"));
    assert!(target.contains("page=1"));
    assert!(target.contains("size=50"));
    assert!(target.contains("sort=timestamp%2Cdesc"));
}

#[tokio::test]
async fn test_oversized_page_is_rejected_locally() {
    let server = MockServer::start(vec![]).await;
    let err = server.client().audit_logs(&AuditLogQuery::new().page(0, 101)).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected(_)));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_time_slots_query_date() {
    let server = MockServer::start(vec![(200, "[]")]).await;
    let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
    let slots = server.client().list_time_slots(10, date).await.unwrap();
    assert!(slots.is_empty());
    assert_eq!(server.requests()[0].target, "/api/providers/10/time-slots?date=2024-06-15");
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ApiConfig::default()
        .with_base_url(&format!("http://{}/api", addr))
        .unwrap()
        .with_retry(1, Duration::from_millis(10));
    let err = HttpApiClient::new(config).unwrap().list_providers().await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "{:?}", err);
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start(vec![(200, r#"{"unexpected": true}"#)]).await;
    let err = server.client().get_patient(1).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
    assert_eq!(server.requests().len(), 1);
}
