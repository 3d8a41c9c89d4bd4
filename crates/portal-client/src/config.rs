//! Client configuration
//!
//! Read once at startup. Every request uses the same timeout and retry policy.

use std::time::Duration;

use url::Url;

use crate::ClientError;

pub const BASE_URL_ENV: &str = "HOSPITAL_API_BASE_URL";
pub const TIMEOUT_ENV: &str = "HOSPITAL_API_TIMEOUT_SECS";
pub const MAX_RETRIES_ENV: &str = "HOSPITAL_API_MAX_RETRIES";
pub const STAFF_ENV: &str = "HOSPITAL_STAFF_USERNAME";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_STAFF_USERNAME: &str = "front-desk";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    base_url: String,
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub staff_username: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            staff_username: DEFAULT_STAFF_USERNAME.to_string(),
        }
    }
}

impl ApiConfig {
    /// Build from the process environment, falling back to defaults
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let mut config = Self::default();

        if let Some(base_url) = get(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            config = config.with_base_url(&base_url)?;
        }
        if let Some(secs) = get(TIMEOUT_ENV) {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|_| ClientError::InvalidSetting(format!("{} must be a number of seconds, got '{}'", TIMEOUT_ENV, secs)))?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = get(MAX_RETRIES_ENV) {
            config.max_retries = retries
                .trim()
                .parse()
                .map_err(|_| ClientError::InvalidSetting(format!("{} must be a whole number, got '{}'", MAX_RETRIES_ENV, retries)))?;
        }
        if let Some(staff) = get(STAFF_ENV).filter(|v| !v.trim().is_empty()) {
            config.staff_username = staff.trim().to_string();
        }

        Ok(config)
    }

    /// Replace the base URL; must be absolute http(s)
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ClientError> {
        let cleaned = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(cleaned).map_err(|e| ClientError::InvalidUrl(format!("'{}': {}", cleaned, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use http or https scheme, got: {}",
                parsed.scheme()
            )));
        }
        self.base_url = cleaned.to_string();
        Ok(self)
    }

    pub fn with_staff_username(mut self, staff_username: impl Into<String>) -> Self {
        self.staff_username = staff_username.into();
        self
    }

    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
