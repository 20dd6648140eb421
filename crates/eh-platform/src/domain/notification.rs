//! Notification Entity

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    EventUpdate,
    NewMessage,
    EventRegistration,
    EventReport,
    ReportUpdate,
    AccountStatus,
    #[default]
    Other,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventUpdate => "event_update",
            Self::NewMessage => "new_message",
            Self::EventRegistration => "event_registration",
            Self::EventReport => "event_report",
            Self::ReportUpdate => "report_update",
            Self::AccountStatus => "account_status",
            Self::Other => "other",
        }
    }
}

/// Optional references attached to a notification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Related {
    pub event: Option<String>,
    pub report: Option<String>,
    pub link: Option<String>,
}

impl Related {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn event(event_id: impl Into<String>) -> Self {
        Self {
            event: Some(event_id.into()),
            ..Self::default()
        }
    }

    pub fn report(report_id: impl Into<String>) -> Self {
        Self {
            report: Some(report_id.into()),
            ..Self::default()
        }
    }

    pub fn with_event(mut self, event_id: impl Into<String>) -> Self {
        self.event = Some(event_id.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,

    /// Recipient user id
    pub user: String,

    pub message: String,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    #[serde(default)]
    pub read: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_event: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_report: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user: impl Into<String>,
        message: impl Into<String>,
        notification_type: NotificationType,
        related: Related,
    ) -> Self {
        Self {
            id: crate::TsidGenerator::generate(),
            user: user.into(),
            message: message.into(),
            notification_type,
            read: false,
            related_event: related.event,
            related_report: related.report,
            link: related.link,
            created_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user == user_id
    }

    /// Wire representation pushed over the live channel
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "user": self.user,
            "message": self.message,
            "type": self.notification_type.as_str(),
            "read": self.read,
            "relatedEvent": self.related_event,
            "relatedReport": self.related_report,
            "link": self.link,
            "createdAt": self.created_at.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_notification_is_unread() {
        let n = Notification::new(
            "u1",
            "Hello",
            NotificationType::EventRegistration,
            Related::event("e1").with_link("/events/e1"),
        );
        assert!(!n.read);
        assert_eq!(n.related_event.as_deref(), Some("e1"));
        assert_eq!(n.link.as_deref(), Some("/events/e1"));
        assert!(n.is_owned_by("u1"));
    }

    #[test]
    fn test_type_field_name() {
        let n = Notification::new("u1", "m", NotificationType::ReportUpdate, Related::none());
        let doc = bson::to_document(&n).unwrap();
        assert_eq!(doc.get_str("type").unwrap(), "report_update");
        assert!(!doc.contains_key("relatedEvent"));

        let json = n.to_json();
        assert_eq!(json["type"], "report_update");
        assert_eq!(json["read"], false);
    }
}
