//! Notifications API

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::api::middleware::Authenticated;
use crate::domain::Notification;
use crate::error::PlatformError;
use crate::service::NotificationDispatcher;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    pub user: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_report: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub created_at: String,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            user: n.user,
            message: n.message,
            notification_type: n.notification_type.as_str().to_string(),
            read: n.read,
            related_event: n.related_event,
            related_report: n.related_report,
            link: n.link,
            created_at: n.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct NotificationsState {
    pub notifications: Arc<NotificationDispatcher>,
}

/// Caller's notifications, newest first
pub async fn list_notifications(
    State(state): State<NotificationsState>,
    auth: Authenticated,
) -> Result<Json<Vec<NotificationResponse>>, PlatformError> {
    let notifications = state.notifications.list_for_user(&auth.0.user_id).await?;
    Ok(Json(notifications.into_iter().map(NotificationResponse::from).collect()))
}

pub async fn mark_notification_read(
    State(state): State<NotificationsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<NotificationResponse>, PlatformError> {
    let notification = state.notifications.mark_read(&id, &auth.0.user_id).await?;
    Ok(Json(notification.into()))
}

pub fn notifications_router(state: NotificationsState) -> Router {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", put(mark_notification_read))
        .with_state(state)
}
