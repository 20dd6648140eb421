//! Report Entity
//!
//! A user's complaint about an event. Reports move from open to resolved
//! exactly once.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::optional_bson_datetime;
use crate::error::{PlatformError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Open,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(rename = "_id")]
    pub id: String,

    pub event: String,

    pub reporter: String,

    pub reason: String,

    #[serde(default)]
    pub status: ReportStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_bson_datetime")]
    pub resolved_at: Option<DateTime<Utc>>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn new(event: impl Into<String>, reporter: impl Into<String>, reason: &str) -> Result<Self> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PlatformError::validation("Reason is required"));
        }

        let now = Utc::now();
        Ok(Self {
            id: crate::TsidGenerator::generate(),
            event: event.into(),
            reporter: reporter.into(),
            reason: reason.to_string(),
            status: ReportStatus::Open,
            resolver: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ReportStatus::Resolved
    }

    pub fn resolve(&mut self, resolver: impl Into<String>, at: DateTime<Utc>) {
        self.status = ReportStatus::Resolved;
        self.resolver = Some(resolver.into());
        self.resolved_at = Some(at);
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_required() {
        assert!(Report::new("e1", "u1", "   ").is_err());
        let report = Report::new("e1", "u1", "  spam  ").unwrap();
        assert_eq!(report.reason, "spam");
        assert_eq!(report.status, ReportStatus::Open);
    }

    #[test]
    fn test_resolve_records_resolver() {
        let mut report = Report::new("e1", "u1", "spam").unwrap();
        let at = Utc::now();
        report.resolve("admin", at);
        assert!(report.is_resolved());
        assert_eq!(report.resolver.as_deref(), Some("admin"));
        assert_eq!(report.resolved_at, Some(at));
    }
}
