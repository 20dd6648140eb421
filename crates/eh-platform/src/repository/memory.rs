//! In-process repositories
//!
//! Used by tests and memory-backed dev runs. Every conditional write takes
//! the collection's write lock for the whole check-and-mutate, which gives
//! the same single-document atomicity MongoDB provides.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{
    Event, EventChanges, EventStatus, Message, Notification, Report, ReportStatus, User, UserRole,
};
use crate::error::{PlatformError, Result};
use crate::repository::{
    EventQuery, EventRepository, MessageRepository, NotificationRepository, ReportRepository,
    UserRepository,
};

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, String)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

fn page<T>(items: Vec<T>, skip: u64, limit: u64) -> Vec<T> {
    items.into_iter().skip(skip as usize).take(limit as usize).collect()
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn insert(&self, user: &User) -> Result<()> {
        let mut users = self.users.write();
        if users.values().any(|u| u.email == user.email) {
            return Err(PlatformError::duplicate("User", "email", &user.email));
        }
        if users.values().any(|u| u.username == user.username) {
            return Err(PlatformError::duplicate("User", "username", &user.username));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.read().get(id).cloned())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<User>> {
        let users = self.users.read();
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = crate::domain::user::normalize_email(email);
        Ok(self.users.read().values().find(|u| u.email == email).cloned())
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_by_reset_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| {
                u.reset_password_token.as_deref() == Some(token_hash)
                    && u.reset_password_expire.map_or(false, |exp| exp > now)
            })
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.read().values().cloned().collect();
        newest_first(&mut users, |u| (u.created_at, u.id.clone()));
        Ok(users)
    }

    async fn find_admin_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .users
            .read()
            .values()
            .filter(|u| u.role == UserRole::Admin)
            .map(|u| u.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut users = self.users.write();
        for other in users.values().filter(|u| u.id != user.id) {
            if other.email == user.email {
                return Err(PlatformError::duplicate("User", "email", &user.email));
            }
            if other.username == user.username {
                return Err(PlatformError::duplicate("User", "username", &user.username));
            }
        }
        if let Some(existing) = users.get_mut(&user.id) {
            *existing = user.clone();
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.users.read().len() as u64)
    }

    async fn count_by_blocked(&self, blocked: bool) -> Result<u64> {
        Ok(self.users.read().values().filter(|u| u.is_blocked == blocked).count() as u64)
    }

    async fn count_verified(&self) -> Result<u64> {
        Ok(self.users.read().values().filter(|u| u.is_verified).count() as u64)
    }
}

#[derive(Default)]
pub struct MemoryEventRepository {
    events: RwLock<HashMap<String, Event>>,
}

impl MemoryEventRepository {
    fn matches(event: &Event, query: &EventQuery) -> bool {
        if let Some(status) = query.status {
            if event.status != status {
                return false;
            }
        }
        if let Some(category) = query.category {
            if event.category != category {
                return false;
            }
        }
        if let Some(from) = query.from_date {
            if event.date < from {
                return false;
            }
        }
        if let Some(location) = query.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            if !event.location.to_lowercase().contains(&location.to_lowercase()) {
                return false;
            }
        }
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let haystack = format!("{} {}", event.title, event.description).to_lowercase();
            if !search
                .split_whitespace()
                .any(|term| haystack.contains(&term.to_lowercase()))
            {
                return false;
            }
        }
        true
    }

    fn sorted_by_date(mut events: Vec<Event>) -> Vec<Event> {
        events.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        events
    }
}

#[async_trait]
impl EventRepository for MemoryEventRepository {
    async fn insert(&self, event: &Event) -> Result<()> {
        self.events.write().insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Event>> {
        Ok(self.events.read().get(id).cloned())
    }

    async fn search(&self, query: &EventQuery, skip: u64, limit: u64) -> Result<(Vec<Event>, u64)> {
        let matching: Vec<Event> = self
            .events
            .read()
            .values()
            .filter(|e| Self::matches(e, query))
            .cloned()
            .collect();
        let total = matching.len() as u64;
        Ok((page(Self::sorted_by_date(matching), skip, limit), total))
    }

    async fn find_all(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self.events.read().values().cloned().collect();
        newest_first(&mut events, |e| (e.created_at, e.id.clone()));
        Ok(events)
    }

    async fn find_by_creator(&self, user_id: &str) -> Result<Vec<Event>> {
        let events = self
            .events
            .read()
            .values()
            .filter(|e| e.creator == user_id)
            .cloned()
            .collect();
        Ok(Self::sorted_by_date(events))
    }

    async fn find_by_attendee(&self, user_id: &str) -> Result<Vec<Event>> {
        let events = self
            .events
            .read()
            .values()
            .filter(|e| e.is_attendee(user_id))
            .cloned()
            .collect();
        Ok(Self::sorted_by_date(events))
    }

    async fn add_attendee(&self, event_id: &str, user_id: &str) -> Result<Option<Event>> {
        let mut events = self.events.write();
        let Some(event) = events.get_mut(event_id) else {
            return Ok(None);
        };
        if event.status != EventStatus::Approved || event.is_attendee(user_id) || event.is_full() {
            return Ok(None);
        }
        event.attendees.push(user_id.to_string());
        event.updated_at = Utc::now();
        Ok(Some(event.clone()))
    }

    async fn remove_attendee(&self, event_id: &str, user_id: &str) -> Result<Option<Event>> {
        let mut events = self.events.write();
        let Some(event) = events.get_mut(event_id) else {
            return Ok(None);
        };
        if !event.is_attendee(user_id) {
            return Ok(None);
        }
        event.attendees.retain(|a| a != user_id);
        event.updated_at = Utc::now();
        Ok(Some(event.clone()))
    }

    async fn update_details(&self, event_id: &str, changes: &EventChanges) -> Result<Option<Event>> {
        let mut events = self.events.write();
        let Some(event) = events.get_mut(event_id) else {
            return Ok(None);
        };
        if let Some(capacity) = changes.capacity {
            if (capacity as usize) < event.attendees.len() {
                return Ok(None);
            }
        }
        changes.apply_to(event, Utc::now());
        Ok(Some(event.clone()))
    }

    async fn set_moderation(
        &self,
        event_id: &str,
        status: EventStatus,
        moderator: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Event>> {
        let mut events = self.events.write();
        let Some(event) = events.get_mut(event_id) else {
            return Ok(None);
        };
        event.status = status;
        event.moderated_by = Some(moderator.to_string());
        event.moderated_at = Some(at);
        event.rejection_reason = reason.map(str::to_string);
        event.updated_at = at;
        Ok(Some(event.clone()))
    }

    async fn delete(&self, event_id: &str) -> Result<bool> {
        Ok(self.events.write().remove(event_id).is_some())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.events.read().len() as u64)
    }

    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64> {
        Ok(self.events.read().values().filter(|e| e.created_at >= since).count() as u64)
    }
}

#[derive(Default)]
pub struct MemoryNotificationRepository {
    notifications: RwLock<HashMap<String, Notification>>,
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        self.notifications
            .write()
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Notification>> {
        Ok(self.notifications.read().get(id).cloned())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Notification>> {
        let mut items: Vec<Notification> = self
            .notifications
            .read()
            .values()
            .filter(|n| n.user == user_id)
            .cloned()
            .collect();
        newest_first(&mut items, |n| (n.created_at, n.id.clone()));
        Ok(items)
    }

    async fn mark_read(&self, id: &str) -> Result<Option<Notification>> {
        let mut notifications = self.notifications.write();
        Ok(notifications.get_mut(id).map(|n| {
            n.read = true;
            n.clone()
        }))
    }
}

#[derive(Default)]
pub struct MemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn insert(&self, message: &Message) -> Result<()> {
        self.messages.write().push(message.clone());
        Ok(())
    }

    async fn find_recent_by_event(&self, event_id: &str, limit: u64) -> Result<Vec<Message>> {
        let messages = self.messages.read();
        let for_event: Vec<&Message> = messages.iter().filter(|m| m.event == event_id).collect();
        let start = for_event.len().saturating_sub(limit as usize);
        Ok(for_event[start..].iter().map(|m| (*m).clone()).collect())
    }

    async fn mark_read_by(&self, event_id: &str, user_id: &str) -> Result<u64> {
        let mut modified = 0;
        for message in self.messages.write().iter_mut() {
            if message.event == event_id
                && message.sender != user_id
                && !message.read_by.iter().any(|r| r == user_id)
            {
                message.read_by.push(user_id.to_string());
                modified += 1;
            }
        }
        Ok(modified)
    }
}

#[derive(Default)]
pub struct MemoryReportRepository {
    reports: RwLock<HashMap<String, Report>>,
}

#[async_trait]
impl ReportRepository for MemoryReportRepository {
    async fn insert(&self, report: &Report) -> Result<()> {
        self.reports.write().insert(report.id.clone(), report.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Report>> {
        Ok(self.reports.read().get(id).cloned())
    }

    async fn find_page(&self, skip: u64, limit: u64) -> Result<(Vec<Report>, u64)> {
        let mut reports: Vec<Report> = self.reports.read().values().cloned().collect();
        let total = reports.len() as u64;
        newest_first(&mut reports, |r| (r.created_at, r.id.clone()));
        Ok((page(reports, skip, limit), total))
    }

    async fn resolve(&self, id: &str, resolver: &str, at: DateTime<Utc>) -> Result<Option<Report>> {
        let mut reports = self.reports.write();
        match reports.get_mut(id) {
            Some(report) if report.status == ReportStatus::Open => {
                report.resolve(resolver, at);
                Ok(Some(report.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventCategory, NewEvent};
    use chrono::Duration;

    fn approved_event(capacity: u32) -> Event {
        Event::new(
            NewEvent {
                title: "Jazz Night".to_string(),
                description: "Live jazz in the park".to_string(),
                date: Utc::now() + Duration::days(3),
                location: "Central Park".to_string(),
                capacity,
                category: EventCategory::Music,
            },
            "creator",
            EventStatus::Approved,
        )
    }

    #[tokio::test]
    async fn test_add_attendee_respects_capacity_and_uniqueness() {
        let repo = MemoryEventRepository::default();
        let event = approved_event(2);
        repo.insert(&event).await.unwrap();

        assert!(repo.add_attendee(&event.id, "a").await.unwrap().is_some());
        assert!(repo.add_attendee(&event.id, "a").await.unwrap().is_none());
        assert!(repo.add_attendee(&event.id, "b").await.unwrap().is_some());
        assert!(repo.add_attendee(&event.id, "c").await.unwrap().is_none());

        let stored = repo.find_by_id(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.attendees, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_capacity_floor_on_update() {
        let repo = MemoryEventRepository::default();
        let event = approved_event(3);
        repo.insert(&event).await.unwrap();
        repo.add_attendee(&event.id, "a").await.unwrap();
        repo.add_attendee(&event.id, "b").await.unwrap();

        let shrink = EventChanges {
            capacity: Some(1),
            ..Default::default()
        };
        assert!(repo.update_details(&event.id, &shrink).await.unwrap().is_none());

        let shrink = EventChanges {
            capacity: Some(2),
            ..Default::default()
        };
        let updated = repo.update_details(&event.id, &shrink).await.unwrap().unwrap();
        assert_eq!(updated.capacity, 2);
    }

    #[tokio::test]
    async fn test_search_filters() {
        let repo = MemoryEventRepository::default();
        let jazz = approved_event(5);
        let mut pending = approved_event(5);
        pending.status = EventStatus::Pending;
        repo.insert(&jazz).await.unwrap();
        repo.insert(&pending).await.unwrap();

        let query = EventQuery {
            status: Some(EventStatus::Approved),
            location: Some("central".to_string()),
            search: Some("JAZZ".to_string()),
            ..Default::default()
        };
        let (events, total) = repo.search(&query, 0, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(events[0].id, jazz.id);

        let query = EventQuery {
            category: Some(EventCategory::Sports),
            ..Default::default()
        };
        let (_, total) = repo.search(&query, 0, 10).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_user_uniqueness() {
        let repo = MemoryUserRepository::default();
        repo.insert(&User::new("alice", "alice@example.com", "h")).await.unwrap();

        let err = repo
            .insert(&User::new("alice2", "ALICE@example.com", "h"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Duplicate { ref field, .. } if field == "email"));

        let err = repo
            .insert(&User::new("alice", "other@example.com", "h"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Duplicate { ref field, .. } if field == "username"));
    }

    #[tokio::test]
    async fn test_update_reports_clashing_field() {
        let repo = MemoryUserRepository::default();
        repo.insert(&User::new("alice", "alice@example.com", "h")).await.unwrap();
        let bob = User::new("bob", "bob@example.com", "h");
        repo.insert(&bob).await.unwrap();

        let mut renamed = bob.clone();
        renamed.username = "alice".to_string();
        let err = repo.update(&renamed).await.unwrap_err();
        assert!(matches!(err, PlatformError::Duplicate { ref field, .. } if field == "username"));

        let mut moved = bob.clone();
        moved.email = "alice@example.com".to_string();
        let err = repo.update(&moved).await.unwrap_err();
        assert!(matches!(err, PlatformError::Duplicate { ref field, .. } if field == "email"));

        let mut unchanged = bob.clone();
        unchanged.is_verified = true;
        repo.update(&unchanged).await.unwrap();
        assert_eq!(repo.count_verified().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recent_messages_oldest_first() {
        let repo = MemoryMessageRepository::default();
        for i in 0..5 {
            repo.insert(&Message::new("e1", "u1", &format!("m{}", i)).unwrap())
                .await
                .unwrap();
        }
        let recent = repo.find_recent_by_event("e1", 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_mark_read_skips_own_messages() {
        let repo = MemoryMessageRepository::default();
        repo.insert(&Message::new("e1", "u1", "mine").unwrap()).await.unwrap();
        repo.insert(&Message::new("e1", "u2", "theirs").unwrap()).await.unwrap();

        assert_eq!(repo.mark_read_by("e1", "u1").await.unwrap(), 1);
        assert_eq!(repo.mark_read_by("e1", "u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resolve_only_once() {
        let repo = MemoryReportRepository::default();
        let report = Report::new("e1", "u1", "spam").unwrap();
        repo.insert(&report).await.unwrap();

        assert!(repo.resolve(&report.id, "admin", Utc::now()).await.unwrap().is_some());
        assert!(repo.resolve(&report.id, "admin", Utc::now()).await.unwrap().is_none());
    }
}
