//! Notification dispatch
//!
//! A notification is persisted first and only then pushed to the
//! recipient's room. A failed push is logged and never undoes the insert.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{Notification, NotificationType, Related};
use crate::error::{PlatformError, Result};
use crate::repository::NotificationRepository;
use crate::service::realtime::{user_room, RoomPublisher, NEW_NOTIFICATION};

pub struct NotificationDispatcher {
    notification_repo: Arc<dyn NotificationRepository>,
    publisher: Arc<dyn RoomPublisher>,
}

impl NotificationDispatcher {
    pub fn new(
        notification_repo: Arc<dyn NotificationRepository>,
        publisher: Arc<dyn RoomPublisher>,
    ) -> Self {
        Self {
            notification_repo,
            publisher,
        }
    }

    pub async fn dispatch(
        &self,
        user_id: &str,
        message: impl Into<String>,
        notification_type: NotificationType,
        related: Related,
    ) -> Result<Notification> {
        let notification = Notification::new(user_id, message, notification_type, related);
        self.notification_repo.insert(&notification).await?;

        match self
            .publisher
            .publish(&user_room(user_id), NEW_NOTIFICATION, notification.to_json())
        {
            Ok(delivered) => debug!(
                user_id,
                notification_id = %notification.id,
                delivered,
                "Notification pushed"
            ),
            Err(e) => warn!(
                user_id,
                notification_id = %notification.id,
                error = %e,
                "Notification stored but live push failed"
            ),
        }

        Ok(notification)
    }

    /// Dispatch the same notification to each user in order; one failure
    /// does not stop the rest. Returns the number of attempts made.
    pub async fn dispatch_each(
        &self,
        user_ids: &[String],
        message: &str,
        notification_type: NotificationType,
        related: Related,
    ) -> usize {
        let mut attempts = 0;
        for user_id in user_ids {
            attempts += 1;
            if let Err(e) = self
                .dispatch(user_id, message, notification_type, related.clone())
                .await
            {
                warn!(
                    user_id = %user_id,
                    notification_type = notification_type.as_str(),
                    error = %e,
                    "Failed to notify user"
                );
            }
        }
        attempts
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Notification>> {
        self.notification_repo.find_by_user(user_id).await
    }

    /// Only the recipient may mark a notification as read
    pub async fn mark_read(&self, notification_id: &str, user_id: &str) -> Result<Notification> {
        let notification = self
            .notification_repo
            .find_by_id(notification_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Notification", notification_id))?;

        if !notification.is_owned_by(user_id) {
            return Err(PlatformError::forbidden(
                "Not authorized to update this notification",
            ));
        }

        self.notification_repo
            .mark_read(notification_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Notification", notification_id))
    }
}
