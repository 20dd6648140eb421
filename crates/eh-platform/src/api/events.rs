//! Events API
//!
//! Event CRUD, the registration workflow endpoints and per-event chat.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::common::{
    MessageResponse, PageLimits, PaginatedResponse, PaginationParams, UserSummary,
};
use crate::api::middleware::{Authenticated, OptionalAuth};
use crate::domain::{Event, EventCategory, EventChanges, NewEvent};
use crate::error::PlatformError;
use crate::repository::EventQuery;
use crate::service::{ChatMessage, ChatService, EventDetails, EventService};

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (UTC) or a bare date (midnight UTC)
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_category(value: &str) -> Result<EventCategory, PlatformError> {
    EventCategory::parse(value)
        .ok_or_else(|| PlatformError::validation(format!("Invalid category: {}", value)))
}

/// Create event request
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: String,
    pub date: String,
    pub location: String,
    pub capacity: i64,
    pub category: Option<String>,
}

impl CreateEventRequest {
    fn into_new_event(self) -> Result<NewEvent, PlatformError> {
        let mut errors = Vec::new();

        let date = parse_date(&self.date);
        if date.is_none() {
            errors.push("Please provide a valid date".to_string());
        }
        let category = match self.category.as_deref() {
            None => Some(EventCategory::default()),
            Some(raw) => EventCategory::parse(raw),
        };
        if category.is_none() {
            errors.push("Please provide a valid category".to_string());
        }

        match (date, category) {
            (Some(date), Some(category)) => Ok(NewEvent {
                title: self.title,
                description: self.description,
                date,
                location: self.location,
                capacity: u32::try_from(self.capacity).unwrap_or(0),
                category,
            }),
            _ => Err(PlatformError::InvalidFields { errors }),
        }
    }
}

/// Update event request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<i64>,
    pub category: Option<String>,
}

impl UpdateEventRequest {
    fn into_changes(self) -> Result<EventChanges, PlatformError> {
        let date = match self.date.as_deref() {
            Some(raw) => Some(
                parse_date(raw).ok_or_else(|| PlatformError::validation("Please provide a valid date"))?,
            ),
            None => None,
        };
        let category = self.category.as_deref().map(parse_category).transpose()?;

        Ok(EventChanges {
            title: self.title,
            description: self.description,
            date,
            location: self.location,
            capacity: self.capacity.map(|c| u32::try_from(c).unwrap_or(0)),
            category,
        })
    }
}

/// Event list query
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub category: Option<String>,
    /// Only events on or after this date
    pub date: Option<String>,
    pub location: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl EventsQuery {
    fn filters(&self) -> Result<EventQuery, PlatformError> {
        let category = self
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(parse_category)
            .transpose()?;
        let from_date = match self.date.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(raw) => Some(
                parse_date(raw).ok_or_else(|| PlatformError::validation(format!("Invalid date: {}", raw)))?,
            ),
            None => None,
        };
        let non_empty = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        Ok(EventQuery {
            status: None,
            category,
            from_date,
            location: non_empty(&self.location),
            search: non_empty(&self.search),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

/// Event response DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub location: String,
    pub capacity: u32,
    pub category: String,
    pub status: String,
    pub creator: String,
    pub attendees: Vec<String>,
    pub attendee_count: usize,
    pub spots_left: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Event> for EventResponse {
    fn from(e: Event) -> Self {
        let attendee_count = e.attendees.len();
        let spots_left = e.spots_left();
        Self {
            id: e.id,
            title: e.title,
            description: e.description,
            date: e.date.to_rfc3339(),
            location: e.location,
            capacity: e.capacity,
            category: e.category.as_str().to_string(),
            status: e.status.as_str().to_string(),
            creator: e.creator,
            attendees: e.attendees,
            attendee_count,
            spots_left,
            rejection_reason: e.rejection_reason,
            moderated_by: e.moderated_by,
            moderated_at: e.moderated_at.map(|t| t.to_rfc3339()),
            created_at: e.created_at.to_rfc3339(),
            updated_at: e.updated_at.to_rfc3339(),
        }
    }
}

/// Event with creator and attendee summaries
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetailsResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub location: String,
    pub capacity: u32,
    pub category: String,
    pub status: String,
    pub creator: Option<UserSummary>,
    pub attendees: Vec<UserSummary>,
    pub attendee_count: usize,
    pub spots_left: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<EventDetails> for EventDetailsResponse {
    fn from(d: EventDetails) -> Self {
        let e = d.event;
        Self {
            attendee_count: e.attendees.len(),
            spots_left: e.spots_left(),
            id: e.id,
            title: e.title,
            description: e.description,
            date: e.date.to_rfc3339(),
            location: e.location,
            capacity: e.capacity,
            category: e.category.as_str().to_string(),
            status: e.status.as_str().to_string(),
            creator: d.creator.map(UserSummary::from),
            attendees: d.attendees.into_iter().map(UserSummary::from).collect(),
            rejection_reason: e.rejection_reason,
            created_at: e.created_at.to_rfc3339(),
            updated_at: e.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub created_events: Vec<EventResponse>,
    pub attending_events: Vec<EventResponse>,
}

#[derive(Debug, Serialize)]
pub struct SenderSummary {
    pub id: String,
    pub username: Option<String>,
}

/// Chat message DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageResponse {
    pub id: String,
    pub event: String,
    pub sender: SenderSummary,
    pub content: String,
    pub read_by: Vec<String>,
    pub created_at: String,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(c: ChatMessage) -> Self {
        let m = c.message;
        Self {
            id: m.id,
            event: m.event,
            sender: SenderSummary {
                id: m.sender,
                username: c.sender_username,
            },
            content: m.content,
            read_by: m.read_by,
            created_at: m.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub msg: String,
    pub updated: u64,
}

/// Events service state
#[derive(Clone)]
pub struct EventsState {
    pub events: Arc<EventService>,
    pub chat: Arc<ChatService>,
    pub limits: PageLimits,
}

pub async fn create_event(
    State(state): State<EventsState>,
    auth: Authenticated,
    Json(req): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), PlatformError> {
    let event = state.events.create(&auth.0, req.into_new_event()?).await?;
    Ok((StatusCode::CREATED, Json(event.into())))
}

/// Approved events, sorted by date
pub async fn list_events(
    State(state): State<EventsState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<PaginatedResponse<EventResponse>>, PlatformError> {
    let page = PaginationParams {
        page: query.page,
        limit: query.limit,
    }
    .resolve(state.limits);

    let (events, total) = state
        .events
        .list(query.filters()?, page.offset(), page.limit as u64)
        .await?;

    let data = events.into_iter().map(EventResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, page, total)))
}

pub async fn dashboard(
    State(state): State<EventsState>,
    auth: Authenticated,
) -> Result<Json<DashboardResponse>, PlatformError> {
    let (created, attending) = state.events.dashboard(&auth.0.user_id).await?;
    Ok(Json(DashboardResponse {
        created_events: created.into_iter().map(EventResponse::from).collect(),
        attending_events: attending.into_iter().map(EventResponse::from).collect(),
    }))
}

pub async fn get_event(
    State(state): State<EventsState>,
    viewer: OptionalAuth,
    Path(id): Path<String>,
) -> Result<Json<EventDetailsResponse>, PlatformError> {
    let details = state.events.get_details(&id, viewer.0.as_ref()).await?;
    Ok(Json(details.into()))
}

pub async fn update_event(
    State(state): State<EventsState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<Json<EventResponse>, PlatformError> {
    let event = state.events.update(&auth.0, &id, req.into_changes()?).await?;
    Ok(Json(event.into()))
}

pub async fn delete_event(
    State(state): State<EventsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, PlatformError> {
    state.events.delete(&auth.0, &id).await?;
    Ok(Json(MessageResponse::new("Event removed")))
}

pub async fn register_for_event(
    State(state): State<EventsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, PlatformError> {
    state.events.register(&id, &auth.0.user_id).await?;
    Ok(Json(MessageResponse::new("Successfully registered for event")))
}

pub async fn unregister_from_event(
    State(state): State<EventsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, PlatformError> {
    state.events.unregister(&id, &auth.0.user_id).await?;
    Ok(Json(MessageResponse::new("Successfully unregistered from event")))
}

pub async fn list_messages(
    State(state): State<EventsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChatMessageResponse>>, PlatformError> {
    let messages = state.chat.history(&auth.0, &id).await?;
    Ok(Json(messages.into_iter().map(ChatMessageResponse::from).collect()))
}

pub async fn post_message(
    State(state): State<EventsState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessageResponse>), PlatformError> {
    let message = state.chat.post(&auth.0, &id, &req.content).await?;
    Ok((StatusCode::CREATED, Json(message.into())))
}

pub async fn mark_messages_read(
    State(state): State<EventsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<MarkReadResponse>, PlatformError> {
    let updated = state.chat.mark_read(&auth.0, &id).await?;
    Ok(Json(MarkReadResponse {
        msg: "Messages marked as read".to_string(),
        updated,
    }))
}

/// Create events router
pub fn events_router(state: EventsState) -> Router {
    Router::new()
        .route("/", post(create_event).get(list_events))
        .route("/dashboard", get(dashboard))
        .route("/register/:id", put(register_for_event))
        .route("/unregister/:id", put(unregister_from_event))
        .route("/:id", get(get_event).put(update_event).delete(delete_event))
        .route("/:id/messages", get(list_messages).post(post_message))
        .route("/:id/messages/read", put(mark_messages_read))
        .with_state(state)
}
