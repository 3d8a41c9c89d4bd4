//! reqwest implementation of [`HospitalApi`]

use async_trait::async_trait;
use chrono::NaiveDate;
use hospital_portal_core::audit::{AccessLogQuery, AuditLogQuery};
use hospital_portal_core::model::{
    AccessLogEntry, Appointment, AuditLogEntry, BookAppointmentRequest, MedicalRecord, NewAccessLog, NewPatient,
    NewPrescription, OtpSendRequest, OtpVerifyRequest, OtpVerifyResponse, Page, Patient, Prescription, Provider,
    TimeSlot,
};
use hospital_portal_core::{ApiError, CardNumber, HospitalApi};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::ClientError;

/// Longest server body quoted in an error message
const MAX_ERROR_BODY: usize = 200;

#[derive(Clone, Debug)]
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: Url,
    config: ApiConfig,
}

impl HttpApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(config.base_url()).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(format!("{} cannot be used as a base URL", base_url)));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Http(format!("Failed to create HTTP client: {}", e)))?;

        info!("Hospital API client targeting {}", base_url);
        Ok(Self { http, base_url, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Base URL plus percent-encoded path segments
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Network(format!("{} cannot be used as a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request, retrying transport failures and 5xx responses
    ///
    /// `build` is called once per attempt. Non-success responses are
    /// classified into [`ApiError`] here, so a 404 or a not-found message
    /// comes back as [`ApiError::NotFound`] and is never retried.
    async fn execute<F>(&self, name: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = self.config.max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("{} (attempt {}/{})", name, attempt, attempts);

            let result = match build().send().await {
                Ok(response) => check_status(response).await,
                Err(e) => Err(classify_transport(&e)),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!("{} failed on attempt {}: {}. Retrying.", name, attempt, e);
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!("{} failed after {} attempts: {}", name, attempt, e);
                    } else {
                        debug!("{} failed: {}", name, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, name: &str, url: Url) -> Result<T, ApiError> {
        let response = self.execute(name, || self.http.get(url.clone())).await?;
        decode(response).await
    }

    async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        name: &str,
        url: Url,
        query: &[(&'static str, String)],
    ) -> Result<T, ApiError> {
        let response = self.execute(name, || self.http.get(url.clone()).query(query)).await?;
        decode(response).await
    }

    async fn send_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        name: &str,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .execute(name, || self.http.request(method.clone(), url.clone()).json(body))
            .await?;
        decode(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());
    Err(ApiError::from_status(status.as_u16(), message))
}

/// Server message from an error body: `message` or `error` of a JSON object, else the text itself
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()).filter(|t| !t.trim().is_empty()) {
                return Some(text.to_string());
            }
        }
        return None;
    }
    Some(body.chars().take(MAX_ERROR_BODY).collect())
}

fn classify_transport(e: &reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout(e.to_string())
    } else if e.is_decode() {
        ApiError::Decode(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await.map_err(|e| classify_transport(&e))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl HospitalApi for HttpApiClient {
    async fn list_patients(&self) -> Result<Vec<Patient>, ApiError> {
        self.get_json("list patients", self.url(&["patients"])?).await
    }

    async fn get_patient(&self, patient_id: i64) -> Result<Patient, ApiError> {
        let id = patient_id.to_string();
        self.get_json("get patient", self.url(&["patients", id.as_str()])?).await
    }

    async fn find_patient_by_card(&self, card_number: &CardNumber) -> Result<Patient, ApiError> {
        let url = self.url(&["patients", "card", card_number.as_str()])?;
        self.get_json("find patient by card", url).await
    }

    async fn create_patient(&self, patient: &NewPatient) -> Result<Patient, ApiError> {
        self.send_json("create patient", Method::POST, self.url(&["patients"])?, patient)
            .await
    }

    async fn update_patient(&self, patient_id: i64, patient: &NewPatient) -> Result<Patient, ApiError> {
        let id = patient_id.to_string();
        self.send_json("update patient", Method::PUT, self.url(&["patients", id.as_str()])?, patient)
            .await
    }

    async fn delete_patient(&self, patient_id: i64) -> Result<(), ApiError> {
        let id = patient_id.to_string();
        let url = self.url(&["patients", id.as_str()])?;
        self.execute("delete patient", || self.http.delete(url.clone())).await?;
        Ok(())
    }

    async fn scan_medical_record(&self, card_number: &CardNumber) -> Result<MedicalRecord, ApiError> {
        let url = self.url(&["medical-records", "scan", card_number.as_str()])?;
        self.get_json("scan medical record", url).await
    }

    async fn medical_record_for_patient(&self, patient_id: i64) -> Result<MedicalRecord, ApiError> {
        let id = patient_id.to_string();
        let url = self.url(&["medical-records", "patient", id.as_str()])?;
        self.get_json("medical record for patient", url).await
    }

    async fn add_prescription(&self, patient_id: i64, prescription: &NewPrescription) -> Result<Prescription, ApiError> {
        let id = patient_id.to_string();
        let url = self.url(&["medical-records", "patient", id.as_str(), "prescriptions"])?;
        self.send_json("add prescription", Method::POST, url, prescription).await
    }

    async fn list_providers(&self) -> Result<Vec<Provider>, ApiError> {
        self.get_json("list providers", self.url(&["providers"])?).await
    }

    async fn list_time_slots(&self, provider_id: i64, date: NaiveDate) -> Result<Vec<TimeSlot>, ApiError> {
        let id = provider_id.to_string();
        let url = self.url(&["providers", id.as_str(), "time-slots"])?;
        let query = [("date", date.format("%Y-%m-%d").to_string())];
        self.get_json_with_query("list time slots", url, &query).await
    }

    async fn book_appointment(&self, request: &BookAppointmentRequest) -> Result<Appointment, ApiError> {
        self.send_json("book appointment", Method::POST, self.url(&["appointments"])?, request)
            .await
    }

    async fn patient_appointments(&self, patient_id: i64) -> Result<Vec<Appointment>, ApiError> {
        let id = patient_id.to_string();
        let url = self.url(&["appointments", "patient", id.as_str()])?;
        self.get_json("patient appointments", url).await
    }

    async fn record_access(&self, entry: &NewAccessLog) -> Result<AccessLogEntry, ApiError> {
        self.send_json("record access", Method::POST, self.url(&["access-logs"])?, entry)
            .await
    }

    async fn access_logs(&self, query: &AccessLogQuery) -> Result<Vec<AccessLogEntry>, ApiError> {
        let url = self.url(&["access-logs"])?;
        self.get_json_with_query("access logs", url, &query.to_query_pairs()).await
    }

    async fn audit_logs(&self, query: &AuditLogQuery) -> Result<Page<AuditLogEntry>, ApiError> {
        let check = query.validate();
        if !check.is_valid() {
            return Err(ApiError::Rejected(check.to_string()));
        }
        let url = self.url(&["audit-logs"])?;
        self.get_json_with_query("audit logs", url, &query.to_query_pairs()).await
    }

    async fn send_otp(&self, request: &OtpSendRequest) -> Result<(), ApiError> {
        let url = self.url(&["otp", "send"])?;
        self.execute("send otp", || self.http.post(url.clone()).json(request)).await?;
        Ok(())
    }

    async fn verify_otp(&self, request: &OtpVerifyRequest) -> Result<OtpVerifyResponse, ApiError> {
        self.send_json("verify otp", Method::POST, self.url(&["otp", "verify"])?, request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message": "Patient not found"}"#).as_deref(), Some("Patient not found"));
        assert_eq!(error_message(r#"{"error": "Bad Request", "status": 400}"#).as_deref(), Some("Bad Request"));
        assert_eq!(error_message(r#"{"status": 500}"#), None);
        assert_eq!(error_message("  upstream unavailable \n").as_deref(), Some("upstream unavailable"));
        assert_eq!(error_message(""), None);
        assert_eq!(error_message(&"x".repeat(500)).map(|m| m.len()), Some(MAX_ERROR_BODY));
    }

    #[test]
    fn test_url_segments_are_encoded() {
        let config = ApiConfig::default().with_base_url("http://localhost:8080/api/").unwrap();
        let client = HttpApiClient::new(config).unwrap();
        let url = client.url(&["medical-records", "scan", "ABC-2024-123"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/medical-records/scan/ABC-2024-123");

        let odd = client.url(&["patients", "card", "A B/C"]).unwrap();
        assert_eq!(odd.as_str(), "http://localhost:8080/api/patients/card/A%20B%2FC");
    }
}
