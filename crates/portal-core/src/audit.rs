//! Audit and access log queries

use chrono::{DateTime, Utc};
use hospital_portal_validation::{validate_page_size, ValidationErrorCode, ValidationResult};
use serde::{Deserialize, Serialize};

use crate::model::AuditAction;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Results are always newest first
pub const AUDIT_SORT: &str = "timestamp,desc";

/// Filters and pagination for the audit trail
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditLogQuery {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub page: usize,
    pub size: usize,
}

impl AuditLogQuery {
    pub fn new() -> Self {
        Self {
            size: DEFAULT_PAGE_SIZE,
            ..Default::default()
        }
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: Option<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = entity_id;
        self
    }

    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn page(mut self, page: usize, size: usize) -> Self {
        self.page = page;
        self.size = size;
        self
    }

    pub fn next_page(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = validate_page_size(self.size);
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                result.add_error("start", "Start time must be before end time", ValidationErrorCode::OutOfRange);
            }
        }
        result
    }

    /// Query-string pairs in the backend's parameter names
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(user_id) = self.user_id {
            pairs.push(("userId", user_id.to_string()));
        }
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            pairs.push(("username", username.to_string()));
        }
        if let Some(action) = self.action {
            pairs.push(("action", action.as_str().to_string()));
        }
        if let Some(entity_type) = self.entity_type.as_deref().filter(|e| !e.is_empty()) {
            pairs.push(("entityType", entity_type.to_string()));
        }
        if let Some(entity_id) = self.entity_id.as_deref().filter(|e| !e.is_empty()) {
            pairs.push(("entityId", entity_id.to_string()));
        }
        if let Some(start) = self.start {
            pairs.push(("startDate", start.to_rfc3339()));
        }
        if let Some(end) = self.end {
            pairs.push(("endDate", end.to_rfc3339()));
        }
        pairs.push(("page", self.page.to_string()));
        pairs.push(("size", self.size.to_string()));
        pairs.push(("sort", AUDIT_SORT.to_string()));
        pairs
    }
}

/// Filters for record access entries
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AccessLogQuery {
    pub patient_id: Option<i64>,
    pub staff_username: Option<String>,
}

impl AccessLogQuery {
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(patient_id) = self.patient_id {
            pairs.push(("patientId", patient_id.to_string()));
        }
        if let Some(staff) = self.staff_username.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("staffUsername", staff.to_string()));
        }
        pairs
    }
}
