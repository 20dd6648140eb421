//! Event Entity
//!
//! An event is a capacity-bounded list of attendees. Registration is only
//! open while the event is approved, a user appears at most once, and the
//! attendee count never exceeds capacity. The checks here mirror the
//! conditional write performed by the event repository, which remains the
//! authority under concurrency.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::optional_bson_datetime;
use crate::error::{PlatformError, Result};

pub const MIN_TITLE_LENGTH: usize = 3;
pub const MIN_DESCRIPTION_LENGTH: usize = 10;
pub const MIN_LOCATION_LENGTH: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Music,
    Sports,
    Art,
    Food,
    Technology,
    Business,
    Health,
    Education,
    #[default]
    Other,
}

impl EventCategory {
    pub const ALL: [EventCategory; 9] = [
        Self::Music,
        Self::Sports,
        Self::Art,
        Self::Food,
        Self::Technology,
        Self::Business,
        Self::Health,
        Self::Education,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Music => "Music",
            Self::Sports => "Sports",
            Self::Art => "Art",
            Self::Food => "Food",
            Self::Technology => "Technology",
            Self::Business => "Business",
            Self::Health => "Health",
            Self::Education => "Education",
            Self::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "_id")]
    pub id: String,

    pub title: String,

    pub description: String,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date: DateTime<Utc>,

    pub location: String,

    pub capacity: u32,

    #[serde(default)]
    pub category: EventCategory,

    #[serde(default)]
    pub status: EventStatus,

    /// User id of the creator
    pub creator: String,

    /// Insertion-ordered, unique user ids
    #[serde(default)]
    pub attendees: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderated_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_bson_datetime")]
    pub moderated_at: Option<DateTime<Utc>>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Validated input for a new event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub capacity: u32,
    pub category: EventCategory,
}

impl NewEvent {
    /// Collect every field error instead of stopping at the first
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        let mut errors = Vec::new();

        if self.title.trim().chars().count() < MIN_TITLE_LENGTH {
            errors.push(format!("Title must be at least {} characters", MIN_TITLE_LENGTH));
        }
        if self.description.trim().chars().count() < MIN_DESCRIPTION_LENGTH {
            errors.push(format!(
                "Description must be at least {} characters",
                MIN_DESCRIPTION_LENGTH
            ));
        }
        if self.date <= now {
            errors.push("Event date must be in the future".to_string());
        }
        if self.location.trim().chars().count() < MIN_LOCATION_LENGTH {
            errors.push(format!("Location must be at least {} characters", MIN_LOCATION_LENGTH));
        }
        if self.capacity < 1 {
            errors.push("Capacity must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PlatformError::InvalidFields { errors })
        }
    }
}

/// Partial update of the editable event fields
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub capacity: Option<u32>,
    pub category: Option<EventCategory>,
}

impl EventChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.date.is_none()
            && self.location.is_none()
            && self.capacity.is_none()
            && self.category.is_none()
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        let mut errors = Vec::new();

        if let Some(title) = &self.title {
            if title.trim().chars().count() < MIN_TITLE_LENGTH {
                errors.push(format!("Title must be at least {} characters", MIN_TITLE_LENGTH));
            }
        }
        if let Some(description) = &self.description {
            if description.trim().chars().count() < MIN_DESCRIPTION_LENGTH {
                errors.push(format!(
                    "Description must be at least {} characters",
                    MIN_DESCRIPTION_LENGTH
                ));
            }
        }
        if let Some(date) = self.date {
            if date <= now {
                errors.push("Event date must be in the future".to_string());
            }
        }
        if let Some(location) = &self.location {
            if location.trim().chars().count() < MIN_LOCATION_LENGTH {
                errors.push(format!("Location must be at least {} characters", MIN_LOCATION_LENGTH));
            }
        }
        if self.capacity == Some(0) {
            errors.push("Capacity must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PlatformError::InvalidFields { errors })
        }
    }

    /// Apply to an in-memory copy; the caller has already checked the capacity floor
    pub fn apply_to(&self, event: &mut Event, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            event.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            event.description = description.trim().to_string();
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(location) = &self.location {
            event.location = location.trim().to_string();
        }
        if let Some(capacity) = self.capacity {
            event.capacity = capacity;
        }
        if let Some(category) = self.category {
            event.category = category;
        }
        event.updated_at = now;
    }
}

impl Event {
    pub fn new(input: NewEvent, creator: impl Into<String>, status: EventStatus) -> Self {
        let now = Utc::now();
        Self {
            id: crate::TsidGenerator::generate(),
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            date: input.date,
            location: input.location.trim().to_string(),
            capacity: input.capacity,
            category: input.category,
            status,
            creator: creator.into(),
            attendees: Vec::new(),
            rejection_reason: None,
            moderated_by: None,
            moderated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_attendee(&self, user_id: &str) -> bool {
        self.attendees.iter().any(|a| a == user_id)
    }

    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator == user_id
    }

    /// Creator or attendee
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.is_creator(user_id) || self.is_attendee(user_id)
    }

    pub fn is_full(&self) -> bool {
        self.attendees.len() >= self.capacity as usize
    }

    pub fn spots_left(&self) -> u32 {
        self.capacity.saturating_sub(self.attendees.len() as u32)
    }

    /// Registration preconditions, first failure wins
    pub fn check_can_register(&self, user_id: &str) -> Result<()> {
        if self.status != EventStatus::Approved {
            return Err(PlatformError::invalid_state(
                "Event is not available for registration",
            ));
        }
        if self.is_attendee(user_id) {
            return Err(PlatformError::conflict("You are already registered for this event"));
        }
        if self.is_full() {
            return Err(PlatformError::conflict("Event is full"));
        }
        Ok(())
    }

    pub fn check_can_unregister(&self, user_id: &str) -> Result<()> {
        if !self.is_attendee(user_id) {
            return Err(PlatformError::invalid_state("You are not registered for this event"));
        }
        Ok(())
    }
}
