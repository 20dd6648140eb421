//! Report escalation
//!
//! New reports are escalated to every admin; resolving a report is a
//! one-way transition guarded by the repository.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::{NotificationType, Related, Report};
use crate::error::{PlatformError, Result};
use crate::repository::{EventRepository, ReportRepository, UserRepository};
use crate::service::authorization::{checks, AuthContext};
use crate::service::notification::NotificationDispatcher;
use crate::service::tasks::BackgroundTasks;

pub struct ReportService {
    report_repo: Arc<dyn ReportRepository>,
    event_repo: Arc<dyn EventRepository>,
    user_repo: Arc<dyn UserRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    tasks: BackgroundTasks,
}

impl ReportService {
    pub fn new(
        report_repo: Arc<dyn ReportRepository>,
        event_repo: Arc<dyn EventRepository>,
        user_repo: Arc<dyn UserRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        tasks: BackgroundTasks,
    ) -> Self {
        Self {
            report_repo,
            event_repo,
            user_repo,
            dispatcher,
            tasks,
        }
    }

    pub async fn create(&self, ctx: &AuthContext, event_id: &str, reason: &str) -> Result<Report> {
        if event_id.trim().is_empty() || reason.trim().is_empty() {
            return Err(PlatformError::validation("Event and reason are required"));
        }

        let event = self
            .event_repo
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Event", event_id))?;

        let report = Report::new(&event.id, &ctx.user_id, reason)?;
        self.report_repo.insert(&report).await?;
        info!(report_id = %report.id, event_id, reporter = %ctx.user_id, "Report created");

        let users = self.user_repo.clone();
        let dispatcher = self.dispatcher.clone();
        let message = format!(
            "{} reported the event \"{}\": {}",
            ctx.username, event.title, report.reason
        );
        let related = Related::report(&report.id).with_event(&event.id);
        self.tasks.submit("report.notify_admins", async move {
            let admins = users.find_admin_ids().await?;
            dispatcher
                .dispatch_each(&admins, &message, NotificationType::EventReport, related)
                .await;
            Ok(())
        });

        Ok(report)
    }

    pub async fn list(&self, ctx: &AuthContext, skip: u64, limit: u64) -> Result<(Vec<Report>, u64)> {
        checks::require_admin(ctx)?;
        self.report_repo.find_page(skip, limit).await
    }

    pub async fn resolve(&self, ctx: &AuthContext, report_id: &str) -> Result<Report> {
        checks::require_admin(ctx)?;

        let report = self
            .report_repo
            .find_by_id(report_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Report", report_id))?;
        if report.is_resolved() {
            return Err(PlatformError::conflict("Report is already resolved"));
        }

        let resolved = self
            .report_repo
            .resolve(report_id, &ctx.user_id, Utc::now())
            .await?
            .ok_or_else(|| PlatformError::conflict("Report is already resolved"))?;
        info!(report_id, resolver = %ctx.user_id, "Report resolved");

        let dispatcher = self.dispatcher.clone();
        let reporter = resolved.reporter.clone();
        let related = Related::report(&resolved.id).with_event(&resolved.event);
        self.tasks.submit("report.notify_reporter", async move {
            dispatcher
                .dispatch(
                    &reporter,
                    "Your report has been reviewed and resolved by an administrator",
                    NotificationType::ReportUpdate,
                    related,
                )
                .await
                .map(|_| ())
        });

        Ok(resolved)
    }
}
