//! Service Layer
//!
//! Business logic for the platform: the registration workflow, notification
//! dispatch, chat, reports, accounts and administration, plus the auth and
//! background-task plumbing they share.

pub mod accounts;
pub mod admin;
pub mod auth;
pub mod authorization;
pub mod chat;
pub mod events;
pub mod mailer;
pub mod notification;
pub mod password;
pub mod realtime;
pub mod reports;
pub mod tasks;

use std::sync::Arc;

pub use accounts::{AccountService, AccountSettings};
pub use admin::{AdminService, PlatformStats};
pub use auth::{extract_bearer_token, AccessTokenClaims, AuthConfig, AuthService};
pub use authorization::{checks, AuthContext, AuthorizationService};
pub use chat::{ChatMessage, ChatService};
pub use events::{EventDetails, EventService};
pub use mailer::{LogMailer, Mailer, SmtpMailer, SmtpSettings};
pub use notification::NotificationDispatcher;
pub use password::PasswordService;
pub use realtime::{RealtimeHub, RoomPublisher};
pub use reports::ReportService;
pub use tasks::BackgroundTasks;

use crate::error::Result;
use crate::repository::Repositories;

/// Settings the services need, mapped from the application config
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub auth: AuthConfig,
    pub accounts: AccountSettings,
    pub require_moderation: bool,
}

/// Every service, wired once at startup and shared by the API layer
#[derive(Clone)]
pub struct PlatformServices {
    pub auth: Arc<AuthService>,
    pub authz: Arc<AuthorizationService>,
    pub accounts: Arc<AccountService>,
    pub events: Arc<EventService>,
    pub chat: Arc<ChatService>,
    pub reports: Arc<ReportService>,
    pub admin: Arc<AdminService>,
    pub notifications: Arc<NotificationDispatcher>,
    pub hub: Arc<RealtimeHub>,
    pub tasks: BackgroundTasks,
}

impl PlatformServices {
    pub fn build(
        repos: &Repositories,
        hub: Arc<RealtimeHub>,
        mailer: Arc<dyn Mailer>,
        settings: PlatformSettings,
    ) -> Result<Self> {
        Self::build_with_publisher(repos, hub.clone(), hub, mailer, settings)
    }

    /// Like [`build`](Self::build) but with a separate publisher for notifications
    pub fn build_with_publisher(
        repos: &Repositories,
        hub: Arc<RealtimeHub>,
        publisher: Arc<dyn RoomPublisher>,
        mailer: Arc<dyn Mailer>,
        settings: PlatformSettings,
    ) -> Result<Self> {
        let tasks = BackgroundTasks::new();
        let auth = Arc::new(AuthService::new(settings.auth));
        let authz = Arc::new(AuthorizationService::new(repos.users.clone()));
        let passwords = Arc::new(PasswordService::new());

        let notifications = Arc::new(NotificationDispatcher::new(
            repos.notifications.clone(),
            publisher.clone(),
        ));

        let accounts = Arc::new(AccountService::new(
            repos.users.clone(),
            auth.clone(),
            passwords,
            mailer.clone(),
            tasks.clone(),
            settings.accounts,
        )?);

        let events = Arc::new(
            EventService::new(
                repos.events.clone(),
                repos.users.clone(),
                notifications.clone(),
                mailer,
                tasks.clone(),
            )
            .with_moderation(settings.require_moderation),
        );

        let chat = Arc::new(ChatService::new(
            repos.events.clone(),
            repos.messages.clone(),
            repos.users.clone(),
            publisher,
        ));

        let reports = Arc::new(ReportService::new(
            repos.reports.clone(),
            repos.events.clone(),
            repos.users.clone(),
            notifications.clone(),
            tasks.clone(),
        ));

        let admin = Arc::new(AdminService::new(
            repos.users.clone(),
            repos.events.clone(),
            notifications.clone(),
            tasks.clone(),
        ));

        Ok(Self {
            auth,
            authz,
            accounts,
            events,
            chat,
            reports,
            admin,
            notifications,
            hub,
            tasks,
        })
    }
}
