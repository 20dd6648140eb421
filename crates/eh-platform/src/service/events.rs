//! Event registration workflow
//!
//! Per (event, user) pair there are two states, registered and not
//! registered. Preconditions are checked against the stored event first so
//! callers get a precise error, then the repository's conditional write
//! decides. A request that loses a race re-reads the event to explain why.
//!
//! Side effects (notifications, emails) are submitted to the background
//! task set after the write and never change its outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::{
    Event, EventChanges, EventStatus, NewEvent, NotificationType, Related, User,
};
use crate::error::{PlatformError, Result};
use crate::repository::{EventQuery, EventRepository, UserRepository};
use crate::service::authorization::{checks, AuthContext};
use crate::service::mailer::{templates, Mailer};
use crate::service::notification::NotificationDispatcher;
use crate::service::tasks::BackgroundTasks;

/// Event with its creator and attendee records resolved
#[derive(Debug, Clone)]
pub struct EventDetails {
    pub event: Event,
    pub creator: Option<User>,
    pub attendees: Vec<User>,
}

pub struct EventService {
    event_repo: Arc<dyn EventRepository>,
    user_repo: Arc<dyn UserRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    mailer: Arc<dyn Mailer>,
    tasks: BackgroundTasks,
    require_moderation: bool,
}

fn event_link(event_id: &str) -> String {
    format!("/events/{}", event_id)
}

impl EventService {
    pub fn new(
        event_repo: Arc<dyn EventRepository>,
        user_repo: Arc<dyn UserRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        mailer: Arc<dyn Mailer>,
        tasks: BackgroundTasks,
    ) -> Self {
        Self {
            event_repo,
            user_repo,
            dispatcher,
            mailer,
            tasks,
            require_moderation: false,
        }
    }

    /// New events from non-admins start pending when enabled
    pub fn with_moderation(mut self, require_moderation: bool) -> Self {
        self.require_moderation = require_moderation;
        self
    }

    async fn load(&self, event_id: &str) -> Result<Event> {
        self.event_repo
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Event", event_id))
    }

    pub async fn create(&self, ctx: &AuthContext, input: NewEvent) -> Result<Event> {
        input.validate(Utc::now())?;

        let status = if ctx.is_admin() || !self.require_moderation {
            EventStatus::Approved
        } else {
            EventStatus::Pending
        };
        let event = Event::new(input, &ctx.user_id, status);
        self.event_repo.insert(&event).await?;

        info!(event_id = %event.id, creator = %ctx.user_id, status = status.as_str(), "Event created");
        Ok(event)
    }

    pub async fn register(&self, event_id: &str, user_id: &str) -> Result<Event> {
        let event = self.load(event_id).await?;
        event.check_can_register(user_id)?;

        let updated = match self.event_repo.add_attendee(event_id, user_id).await? {
            Some(updated) => updated,
            None => {
                let current = self.load(event_id).await?;
                current.check_can_register(user_id)?;
                return Err(PlatformError::conflict("Event is full"));
            }
        };

        info!(event_id, user_id, attendees = updated.attendees.len(), "User registered for event");
        self.submit_registration_effects(&updated, user_id);
        Ok(updated)
    }

    pub async fn unregister(&self, event_id: &str, user_id: &str) -> Result<Event> {
        let event = self.load(event_id).await?;
        event.check_can_unregister(user_id)?;

        let updated = match self.event_repo.remove_attendee(event_id, user_id).await? {
            Some(updated) => updated,
            None => {
                let current = self.load(event_id).await?;
                current.check_can_unregister(user_id)?;
                return Err(PlatformError::invalid_state("You are not registered for this event"));
            }
        };

        info!(event_id, user_id, attendees = updated.attendees.len(), "User unregistered from event");
        self.submit_unregistration_effects(&updated, user_id);
        Ok(updated)
    }

    fn submit_registration_effects(&self, event: &Event, user_id: &str) {
        let dispatcher = self.dispatcher.clone();
        let (uid, eid, title) = (user_id.to_string(), event.id.clone(), event.title.clone());
        self.tasks.submit("registration.notify_attendee", async move {
            dispatcher
                .dispatch(
                    &uid,
                    format!("You have successfully registered for \"{}\"", title),
                    NotificationType::EventRegistration,
                    Related::event(&eid).with_link(event_link(&eid)),
                )
                .await
                .map(|_| ())
        });

        let dispatcher = self.dispatcher.clone();
        let users = self.user_repo.clone();
        let (uid, creator, eid, title) = (
            user_id.to_string(),
            event.creator.clone(),
            event.id.clone(),
            event.title.clone(),
        );
        self.tasks.submit("registration.notify_creator", async move {
            let username = users
                .find_by_id(&uid)
                .await?
                .map(|u| u.username)
                .unwrap_or_else(|| "Someone".to_string());
            dispatcher
                .dispatch(
                    &creator,
                    format!("{} registered for your event \"{}\"", username, title),
                    NotificationType::EventRegistration,
                    Related::event(&eid).with_link(event_link(&eid)),
                )
                .await
                .map(|_| ())
        });

        let mailer = self.mailer.clone();
        let users = self.user_repo.clone();
        let uid = user_id.to_string();
        let snapshot = event.clone();
        self.tasks.submit("registration.email_attendee", async move {
            let user = users
                .find_by_id(&uid)
                .await?
                .ok_or_else(|| PlatformError::not_found("User", &uid))?;
            let (subject, body) = templates::registration_confirmation(
                &user.username,
                &snapshot.title,
                &snapshot.date.to_rfc2822(),
                &snapshot.location,
            );
            mailer.send(&user.email, &subject, &body).await
        });

        let mailer = self.mailer.clone();
        let users = self.user_repo.clone();
        let uid = user_id.to_string();
        let snapshot = event.clone();
        self.tasks.submit("registration.email_creator", async move {
            let creator = users
                .find_by_id(&snapshot.creator)
                .await?
                .ok_or_else(|| PlatformError::not_found("User", &snapshot.creator))?;
            let attendee_name = users
                .find_by_id(&uid)
                .await?
                .map(|u| u.username)
                .unwrap_or_else(|| "Someone".to_string());
            let (subject, body) = templates::creator_registration_summary(
                &creator.username,
                &attendee_name,
                &snapshot.title,
                snapshot.attendees.len(),
                snapshot.capacity,
            );
            mailer.send(&creator.email, &subject, &body).await
        });
    }

    fn submit_unregistration_effects(&self, event: &Event, user_id: &str) {
        let dispatcher = self.dispatcher.clone();
        let (uid, eid, title) = (user_id.to_string(), event.id.clone(), event.title.clone());
        self.tasks.submit("unregistration.notify_attendee", async move {
            dispatcher
                .dispatch(
                    &uid,
                    format!("You have unregistered from \"{}\"", title),
                    NotificationType::EventRegistration,
                    Related::event(&eid).with_link(event_link(&eid)),
                )
                .await
                .map(|_| ())
        });

        let dispatcher = self.dispatcher.clone();
        let users = self.user_repo.clone();
        let (uid, creator, eid, title) = (
            user_id.to_string(),
            event.creator.clone(),
            event.id.clone(),
            event.title.clone(),
        );
        self.tasks.submit("unregistration.notify_creator", async move {
            let username = users
                .find_by_id(&uid)
                .await?
                .map(|u| u.username)
                .unwrap_or_else(|| "Someone".to_string());
            dispatcher
                .dispatch(
                    &creator,
                    format!("{} unregistered from your event \"{}\"", username, title),
                    NotificationType::EventRegistration,
                    Related::event(&eid).with_link(event_link(&eid)),
                )
                .await
                .map(|_| ())
        });
    }

    /// Partial update by the owner or an admin; attendees are told afterwards
    pub async fn update(&self, ctx: &AuthContext, event_id: &str, changes: EventChanges) -> Result<Event> {
        let event = self.load(event_id).await?;
        checks::require_owner_or_admin(ctx, &event.creator)?;
        changes.validate(Utc::now())?;

        if changes.is_empty() {
            return Ok(event);
        }
        if let Some(capacity) = changes.capacity {
            if (capacity as usize) < event.attendees.len() {
                return Err(PlatformError::conflict(format!(
                    "Capacity cannot be lower than the current number of attendees ({})",
                    event.attendees.len()
                )));
            }
        }

        let updated = match self.event_repo.update_details(event_id, &changes).await? {
            Some(updated) => updated,
            None => {
                let current = self.load(event_id).await?;
                return Err(PlatformError::conflict(format!(
                    "Capacity cannot be lower than the current number of attendees ({})",
                    current.attendees.len()
                )));
            }
        };

        info!(event_id, updated_by = %ctx.user_id, "Event updated");

        let dispatcher = self.dispatcher.clone();
        let attendees = updated.attendees.clone();
        let message = format!("The event \"{}\" has been updated", updated.title);
        let eid = updated.id.clone();
        self.tasks.submit("event_update.notify_attendees", async move {
            dispatcher
                .dispatch_each(
                    &attendees,
                    &message,
                    NotificationType::EventUpdate,
                    Related::event(&eid).with_link(event_link(&eid)),
                )
                .await;
            Ok(())
        });

        Ok(updated)
    }

    /// Every current attendee is notified, in order, before the event is removed
    pub async fn delete(&self, ctx: &AuthContext, event_id: &str) -> Result<()> {
        let event = self.load(event_id).await?;
        checks::require_owner_or_admin(ctx, &event.creator)?;

        let attempts = self
            .dispatcher
            .dispatch_each(
                &event.attendees,
                &format!("The event \"{}\" has been cancelled", event.title),
                NotificationType::EventUpdate,
                Related::none(),
            )
            .await;

        if !self.event_repo.delete(event_id).await? {
            return Err(PlatformError::not_found("Event", event_id));
        }

        info!(event_id, deleted_by = %ctx.user_id, notified = attempts, "Event deleted");
        Ok(())
    }

    pub async fn moderate(
        &self,
        ctx: &AuthContext,
        event_id: &str,
        status: EventStatus,
        reason: Option<String>,
    ) -> Result<Event> {
        checks::require_admin(ctx)?;
        if status == EventStatus::Pending {
            return Err(PlatformError::validation("Status must be approved or rejected"));
        }
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());

        let event = self
            .event_repo
            .set_moderation(event_id, status, &ctx.user_id, reason.as_deref(), Utc::now())
            .await?
            .ok_or_else(|| PlatformError::not_found("Event", event_id))?;

        info!(event_id, moderator = %ctx.user_id, status = status.as_str(), "Event moderated");

        let dispatcher = self.dispatcher.clone();
        let (creator, eid) = (event.creator.clone(), event.id.clone());
        let message = match (&status, &reason) {
            (EventStatus::Rejected, Some(reason)) => {
                format!("Your event \"{}\" was rejected: {}", event.title, reason)
            }
            _ => format!("Your event \"{}\" was {}", event.title, status.as_str()),
        };
        self.tasks.submit("moderation.notify_creator", async move {
            dispatcher
                .dispatch(
                    &creator,
                    message,
                    NotificationType::EventUpdate,
                    Related::event(&eid).with_link(event_link(&eid)),
                )
                .await
                .map(|_| ())
        });

        Ok(event)
    }

    /// Approved events only
    pub async fn list(&self, mut query: EventQuery, skip: u64, limit: u64) -> Result<(Vec<Event>, u64)> {
        query.status = Some(EventStatus::Approved);
        self.event_repo.search(&query, skip, limit).await
    }

    pub async fn list_all(&self) -> Result<Vec<Event>> {
        self.event_repo.find_all().await
    }

    /// (created, attending)
    pub async fn dashboard(&self, user_id: &str) -> Result<(Vec<Event>, Vec<Event>)> {
        let created = self.event_repo.find_by_creator(user_id).await?;
        let attending = self.event_repo.find_by_attendee(user_id).await?;
        Ok((created, attending))
    }

    /// Unapproved events are only visible to their creator and admins
    pub async fn get_details(&self, event_id: &str, viewer: Option<&AuthContext>) -> Result<EventDetails> {
        let event = self.load(event_id).await?;

        if event.status != EventStatus::Approved {
            let allowed = viewer.map_or(false, |v| v.is_admin() || event.is_creator(&v.user_id));
            if !allowed {
                return Err(PlatformError::not_found("Event", event_id));
            }
        }

        let creator = self.user_repo.find_by_id(&event.creator).await?;
        let attendees = self.user_repo.find_by_ids(&event.attendees).await?;
        Ok(EventDetails {
            event,
            creator,
            attendees,
        })
    }

    pub async fn get(&self, event_id: &str) -> Result<Event> {
        self.load(event_id).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.event_repo.count().await
    }

    pub async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64> {
        self.event_repo.count_created_since(since).await
    }
}
