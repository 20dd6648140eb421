//! Administration: user blocking and platform statistics

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::domain::{NotificationType, Related, User};
use crate::error::{PlatformError, Result};
use crate::repository::{EventRepository, UserRepository};
use crate::service::authorization::{checks, AuthContext};
use crate::service::notification::NotificationDispatcher;
use crate::service::tasks::BackgroundTasks;

/// Window for the "recent events" statistic
const RECENT_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_users: u64,
    pub total_events: u64,
    pub active_users: u64,
    pub blocked_users: u64,
    pub recent_events: u64,
}

pub struct AdminService {
    user_repo: Arc<dyn UserRepository>,
    event_repo: Arc<dyn EventRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    tasks: BackgroundTasks,
}

impl AdminService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        event_repo: Arc<dyn EventRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        tasks: BackgroundTasks,
    ) -> Self {
        Self {
            user_repo,
            event_repo,
            dispatcher,
            tasks,
        }
    }

    pub async fn list_users(&self, ctx: &AuthContext) -> Result<Vec<User>> {
        checks::require_admin(ctx)?;
        self.user_repo.find_all().await
    }

    /// Flip a user's blocked flag; admins cannot be blocked
    pub async fn toggle_block(&self, ctx: &AuthContext, user_id: &str) -> Result<User> {
        checks::require_admin(ctx)?;

        let mut user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("User", user_id))?;
        if user.is_admin() {
            return Err(PlatformError::validation("Admin accounts cannot be blocked"));
        }

        let blocked = user.toggle_blocked();
        self.user_repo.update(&user).await?;
        info!(user_id, blocked, admin = %ctx.user_id, "User block status changed");

        let dispatcher = self.dispatcher.clone();
        let target = user.id.clone();
        let message = if blocked {
            "Your account has been blocked by an administrator"
        } else {
            "Your account has been unblocked"
        };
        self.tasks.submit("admin.notify_block_status", async move {
            dispatcher
                .dispatch(&target, message, NotificationType::AccountStatus, Related::none())
                .await
                .map(|_| ())
        });

        Ok(user)
    }

    pub async fn stats(&self, ctx: &AuthContext) -> Result<PlatformStats> {
        checks::require_admin(ctx)?;

        let since = Utc::now() - Duration::days(RECENT_DAYS);
        Ok(PlatformStats {
            total_users: self.user_repo.count().await?,
            total_events: self.event_repo.count().await?,
            active_users: self.user_repo.count_verified().await?,
            blocked_users: self.user_repo.count_by_blocked(true).await?,
            recent_events: self.event_repo.count_created_since(since).await?,
        })
    }
}
