//! Administration API
//!
//! Every route requires an admin caller.

use axum::{
    extract::{Path, State},
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::UserResponse;
use crate::api::common::MessageResponse;
use crate::api::events::EventResponse;
use crate::api::middleware::AdminOnly;
use crate::domain::EventStatus;
use crate::error::PlatformError;
use crate::service::{AdminService, EventService, PlatformStats};

#[derive(Debug, Deserialize)]
pub struct ModerateRequest {
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct AdminState {
    pub admin: Arc<AdminService>,
    pub events: Arc<EventService>,
}

pub async fn list_users(
    State(state): State<AdminState>,
    admin: AdminOnly,
) -> Result<Json<Vec<UserResponse>>, PlatformError> {
    let users = state.admin.list_users(&admin.0).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

pub async fn toggle_block(
    State(state): State<AdminState>,
    admin: AdminOnly,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, PlatformError> {
    let user = state.admin.toggle_block(&admin.0, &id).await?;
    Ok(Json(user.into()))
}

/// Every event regardless of status, newest first
pub async fn list_events(
    State(state): State<AdminState>,
    _admin: AdminOnly,
) -> Result<Json<Vec<EventResponse>>, PlatformError> {
    let events = state.events.list_all().await?;
    Ok(Json(events.into_iter().map(EventResponse::from).collect()))
}

pub async fn delete_event(
    State(state): State<AdminState>,
    admin: AdminOnly,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, PlatformError> {
    state.events.delete(&admin.0, &id).await?;
    Ok(Json(MessageResponse::new("Event removed")))
}

pub async fn moderate_event(
    State(state): State<AdminState>,
    admin: AdminOnly,
    Path(id): Path<String>,
    Json(req): Json<ModerateRequest>,
) -> Result<Json<EventResponse>, PlatformError> {
    let status = EventStatus::parse(req.status.trim())
        .ok_or_else(|| PlatformError::validation("Status must be approved or rejected"))?;
    let event = state.events.moderate(&admin.0, &id, status, req.reason).await?;
    Ok(Json(event.into()))
}

pub async fn stats(
    State(state): State<AdminState>,
    admin: AdminOnly,
) -> Result<Json<PlatformStats>, PlatformError> {
    Ok(Json(state.admin.stats(&admin.0).await?))
}

pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/block", put(toggle_block))
        .route("/events", get(list_events))
        .route("/events/:id", delete(delete_event))
        .route("/events/:id/moderate", put(moderate_event))
        .route("/stats", get(stats))
        .with_state(state)
}
