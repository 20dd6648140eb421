//! Domain Entities

pub mod user;
pub mod event;
pub mod notification;
pub mod message;
pub mod report;

pub use user::{User, UserRole};
pub use event::{Event, EventCategory, EventChanges, EventStatus, NewEvent};
pub use notification::{Notification, NotificationType, Related};
pub use message::{Message, MAX_MESSAGE_LENGTH};
pub use report::{Report, ReportStatus};

/// Serde adapter storing `Option<DateTime<Utc>>` as a BSON datetime
pub mod optional_bson_datetime {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => bson::DateTime::from_chrono(*dt).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<bson::DateTime>::deserialize(deserializer)?.map(|dt| dt.to_chrono()))
    }
}
