//! HTTP client for the hospital REST API
//!
//! [`HttpApiClient`] implements [`hospital_portal_core::HospitalApi`] with
//! reqwest. Failed responses are classified once, here: callers receive a
//! typed [`hospital_portal_core::ApiError`] and never look at status codes.

pub mod client;
pub mod config;

pub use client::HttpApiClient;
pub use config::ApiConfig;

/// Problems building the client itself (bad configuration)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("HTTP client error: {0}")]
    Http(String),
}
