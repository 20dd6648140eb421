//! Repository Layer
//!
//! Storage traits for every collection, with a MongoDB implementation and
//! an in-process one. Both honour the same single-document conditional
//! updates, which are the only concurrency boundary for domain state.

pub mod memory;
pub mod mongo;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Event, EventCategory, EventChanges, EventStatus, Message, Notification, Report, User,
};
use crate::error::Result;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Duplicate` when the email or username is taken
    async fn insert(&self, user: &User) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;
    /// Users in the order of `ids`; unknown ids are skipped
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>>;
    /// Only matches tokens whose expiry is after `now`
    async fn find_by_reset_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>>;
    /// Newest first
    async fn find_all(&self) -> Result<Vec<User>>;
    async fn find_admin_ids(&self) -> Result<Vec<String>>;
    async fn update(&self, user: &User) -> Result<()>;
    async fn count(&self) -> Result<u64>;
    async fn count_by_blocked(&self, blocked: bool) -> Result<u64>;
    async fn count_verified(&self) -> Result<u64>;
}

/// Filters for the public event listing
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub status: Option<EventStatus>,
    pub category: Option<EventCategory>,
    /// Events on or after this instant
    pub from_date: Option<DateTime<Utc>>,
    /// Case-insensitive literal match on location
    pub location: Option<String>,
    /// Free-text search over title and description
    pub search: Option<String>,
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert(&self, event: &Event) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Event>>;
    /// Date ascending; returns the page and the total match count
    async fn search(&self, query: &EventQuery, skip: u64, limit: u64) -> Result<(Vec<Event>, u64)>;
    /// Newest first
    async fn find_all(&self) -> Result<Vec<Event>>;
    async fn find_by_creator(&self, user_id: &str) -> Result<Vec<Event>>;
    async fn find_by_attendee(&self, user_id: &str) -> Result<Vec<Event>>;

    /// Append `user_id` iff the event is approved, the user is absent and
    /// the attendee count is below capacity. `None` when no document matched.
    async fn add_attendee(&self, event_id: &str, user_id: &str) -> Result<Option<Event>>;

    /// Remove `user_id` iff currently an attendee. `None` when no document matched.
    async fn remove_attendee(&self, event_id: &str, user_id: &str) -> Result<Option<Event>>;

    /// Apply `changes` iff a new capacity is not below the current attendee count
    async fn update_details(&self, event_id: &str, changes: &EventChanges) -> Result<Option<Event>>;

    async fn set_moderation(
        &self,
        event_id: &str,
        status: EventStatus,
        moderator: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Event>>;

    async fn delete(&self, event_id: &str) -> Result<bool>;
    async fn count(&self) -> Result<u64>;
    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Notification>>;
    /// Newest first
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Notification>>;
    async fn mark_read(&self, id: &str) -> Result<Option<Notification>>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: &Message) -> Result<()>;
    /// The most recent `limit` messages of an event, oldest first
    async fn find_recent_by_event(&self, event_id: &str, limit: u64) -> Result<Vec<Message>>;
    /// Add `user_id` to `readBy` of messages sent by others; returns the number modified
    async fn mark_read_by(&self, event_id: &str, user_id: &str) -> Result<u64>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn insert(&self, report: &Report) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Report>>;
    /// Newest first; returns the page and the total count
    async fn find_page(&self, skip: u64, limit: u64) -> Result<(Vec<Report>, u64)>;
    /// Resolve iff still open. `None` when no open report matched.
    async fn resolve(&self, id: &str, resolver: &str, at: DateTime<Utc>) -> Result<Option<Report>>;
}

/// All repositories behind trait objects, shared by the services
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub events: Arc<dyn EventRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub reports: Arc<dyn ReportRepository>,
}

impl Repositories {
    pub fn mongo(db: &mongodb::Database) -> Self {
        Self {
            users: Arc::new(mongo::MongoUserRepository::new(db)),
            events: Arc::new(mongo::MongoEventRepository::new(db)),
            notifications: Arc::new(mongo::MongoNotificationRepository::new(db)),
            messages: Arc::new(mongo::MongoMessageRepository::new(db)),
            reports: Arc::new(mongo::MongoReportRepository::new(db)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(memory::MemoryUserRepository::default()),
            events: Arc::new(memory::MemoryEventRepository::default()),
            notifications: Arc::new(memory::MemoryNotificationRepository::default()),
            messages: Arc::new(memory::MemoryMessageRepository::default()),
            reports: Arc::new(memory::MemoryReportRepository::default()),
        }
    }
}

/// Arrange users fetched by an unordered lookup in the order of `ids`
pub(crate) fn order_by_ids(ids: &[String], users: Vec<User>) -> Vec<User> {
    let mut by_id: HashMap<String, User> = users.into_iter().map(|u| (u.id.clone(), u)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> User {
        let mut user = User::new(id, &format!("{id}@example.com"), "hash");
        user.id = id.to_string();
        user
    }

    #[test]
    fn test_order_by_ids_follows_requested_order() {
        let ids = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        let fetched = vec![user("a"), user("c"), user("b")];

        let ordered: Vec<String> = order_by_ids(&ids, fetched).into_iter().map(|u| u.id).collect();
        assert_eq!(ordered, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_order_by_ids_skips_missing_users() {
        let ids = vec!["gone".to_string(), "a".to_string()];

        let ordered: Vec<String> = order_by_ids(&ids, vec![user("a")]).into_iter().map(|u| u.id).collect();
        assert_eq!(ordered, vec!["a"]);
    }
}
