//! Event chat
//!
//! Only the creator and attendees of an event may read or post. New
//! messages are broadcast to the `event-{id}` room after they are stored.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{Event, Message, User};
use crate::error::{PlatformError, Result};
use crate::repository::{EventRepository, MessageRepository, UserRepository};
use crate::service::authorization::AuthContext;
use crate::service::realtime::{event_room, RoomPublisher, NEW_MESSAGE};

/// Messages returned per history request
pub const HISTORY_LIMIT: u64 = 100;

/// A message with its sender's username resolved
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub message: Message,
    pub sender_username: Option<String>,
}

impl ChatMessage {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.message.id,
            "event": self.message.event,
            "sender": {
                "id": self.message.sender,
                "username": self.sender_username,
            },
            "content": self.message.content,
            "readBy": self.message.read_by,
            "createdAt": self.message.created_at.to_rfc3339(),
        })
    }
}

pub struct ChatService {
    event_repo: Arc<dyn EventRepository>,
    message_repo: Arc<dyn MessageRepository>,
    user_repo: Arc<dyn UserRepository>,
    publisher: Arc<dyn RoomPublisher>,
}

impl ChatService {
    pub fn new(
        event_repo: Arc<dyn EventRepository>,
        message_repo: Arc<dyn MessageRepository>,
        user_repo: Arc<dyn UserRepository>,
        publisher: Arc<dyn RoomPublisher>,
    ) -> Self {
        Self {
            event_repo,
            message_repo,
            user_repo,
            publisher,
        }
    }

    async fn participant_event(&self, ctx: &AuthContext, event_id: &str) -> Result<Event> {
        let event = self
            .event_repo
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Event", event_id))?;

        if !event.is_participant(&ctx.user_id) {
            return Err(PlatformError::forbidden(
                "Only the creator and attendees can access this chat",
            ));
        }
        Ok(event)
    }

    pub async fn history(&self, ctx: &AuthContext, event_id: &str) -> Result<Vec<ChatMessage>> {
        self.participant_event(ctx, event_id).await?;

        let messages = self
            .message_repo
            .find_recent_by_event(event_id, HISTORY_LIMIT)
            .await?;

        let mut sender_ids: Vec<String> = messages.iter().map(|m| m.sender.clone()).collect();
        sender_ids.sort();
        sender_ids.dedup();
        let names: HashMap<String, String> = self
            .user_repo
            .find_by_ids(&sender_ids)
            .await?
            .into_iter()
            .map(|u: User| (u.id, u.username))
            .collect();

        Ok(messages
            .into_iter()
            .map(|message| {
                let sender_username = names.get(&message.sender).cloned();
                ChatMessage {
                    message,
                    sender_username,
                }
            })
            .collect())
    }

    pub async fn post(&self, ctx: &AuthContext, event_id: &str, content: &str) -> Result<ChatMessage> {
        self.participant_event(ctx, event_id).await?;

        let message = Message::new(event_id, &ctx.user_id, content)?;
        self.message_repo.insert(&message).await?;

        let chat = ChatMessage {
            message,
            sender_username: Some(ctx.username.clone()),
        };

        match self.publisher.publish(&event_room(event_id), NEW_MESSAGE, chat.to_json()) {
            Ok(delivered) => debug!(event_id, delivered, "Chat message broadcast"),
            Err(e) => warn!(event_id, error = %e, "Chat message stored but broadcast failed"),
        }

        Ok(chat)
    }

    /// Marks every message from other senders as read by the caller
    pub async fn mark_read(&self, ctx: &AuthContext, event_id: &str) -> Result<u64> {
        if self.event_repo.find_by_id(event_id).await?.is_none() {
            return Err(PlatformError::not_found("Event", event_id));
        }
        self.message_repo.mark_read_by(event_id, &ctx.user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventCategory, EventStatus, NewEvent, UserRole};
    use crate::repository::Repositories;
    use crate::service::realtime::RealtimeHub;
    use chrono::{Duration, Utc};

    fn ctx(user_id: &str, username: &str) -> AuthContext {
        AuthContext {
            user_id: user_id.to_string(),
            role: UserRole::User,
            username: username.to_string(),
            email: format!("{}@example.com", username),
        }
    }

    async fn setup() -> (ChatService, Arc<RealtimeHub>, Event) {
        let repos = Repositories::in_memory();
        let hub = Arc::new(RealtimeHub::new());
        let event = Event::new(
            NewEvent {
                title: "Board games".to_string(),
                description: "Weekly board game evening".to_string(),
                date: Utc::now() + Duration::days(1),
                location: "Library".to_string(),
                capacity: 10,
                category: EventCategory::Other,
            },
            "creator",
            EventStatus::Approved,
        );
        repos.events.insert(&event).await.unwrap();
        repos.events.add_attendee(&event.id, "attendee").await.unwrap();

        let chat = ChatService::new(repos.events, repos.messages, repos.users, hub.clone());
        (chat, hub, event)
    }

    #[tokio::test]
    async fn test_outsider_is_forbidden() {
        let (chat, _, event) = setup().await;
        let err = chat.history(&ctx("stranger", "s"), &event.id).await.unwrap_err();
        assert!(matches!(err, PlatformError::Forbidden { .. }));

        let err = chat.post(&ctx("stranger", "s"), &event.id, "hi").await.unwrap_err();
        assert!(matches!(err, PlatformError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_post_broadcasts_to_event_room() {
        let (chat, hub, event) = setup().await;
        let (conn, mut rx) = hub.connect();
        hub.join(conn, &event_room(&event.id));

        let posted = chat
            .post(&ctx("attendee", "ann"), &event.id, "  see you there  ")
            .await
            .unwrap();
        assert_eq!(posted.message.content, "see you there");

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.event, NEW_MESSAGE);
        assert_eq!(frame.payload["sender"]["username"], "ann");

        let history = chat.history(&ctx("creator", "cat"), &event.id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_unknown_event() {
        let (chat, _, _) = setup().await;
        let err = chat.mark_read(&ctx("attendee", "ann"), "missing").await.unwrap_err();
        assert!(matches!(err, PlatformError::NotFound { .. }));
    }
}
