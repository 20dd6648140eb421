//! Registration Workflow Integration Tests
//!
//! Drives the services end to end over the in-memory repositories:
//! capacity under concurrency, side-effect isolation, cancellation
//! notices and report resolution.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use eh_platform::domain::{
    Event, EventCategory, EventStatus, NewEvent, Notification, NotificationType, User, UserRole,
};
use eh_platform::error::Result;
use eh_platform::repository::{NotificationRepository, Repositories};
use eh_platform::service::realtime::{user_room, NEW_NOTIFICATION};
use eh_platform::service::{
    AccountSettings, AuthConfig, AuthContext, Mailer, PlatformServices, PlatformSettings,
    RealtimeHub, RoomPublisher,
};
use eh_platform::PlatformError;

/// Captures outgoing mail instead of sending it
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(to, _)| to.clone()).collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<()> {
        self.sent.lock().unwrap().push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Notification store that fails inserts for selected recipients and
/// records every attempt in order
struct FlakyNotifications {
    inner: Arc<dyn NotificationRepository>,
    failing: HashSet<String>,
    attempts: Mutex<Vec<String>>,
}

impl FlakyNotifications {
    fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationRepository for FlakyNotifications {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        self.attempts.lock().unwrap().push(notification.user.clone());
        if self.failing.contains(&notification.user) {
            return Err(PlatformError::internal("notification store unavailable"));
        }
        self.inner.insert(notification).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Notification>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Notification>> {
        self.inner.find_by_user(user_id).await
    }

    async fn mark_read(&self, id: &str) -> Result<Option<Notification>> {
        self.inner.mark_read(id).await
    }
}

/// Live channel whose every delivery fails
struct DownPublisher;

impl RoomPublisher for DownPublisher {
    fn publish(&self, room: &str, _event: &str, _payload: serde_json::Value) -> Result<usize> {
        Err(PlatformError::Realtime {
            message: format!("room {} unreachable", room),
        })
    }
}

struct Harness {
    repos: Repositories,
    services: PlatformServices,
    hub: Arc<RealtimeHub>,
    mailer: Arc<RecordingMailer>,
}

fn settings() -> PlatformSettings {
    PlatformSettings {
        auth: AuthConfig {
            secret_key: "workflow-test-secret".to_string(),
            issuer: "eventhub".to_string(),
            access_token_expiry_secs: 3600,
        },
        accounts: AccountSettings::default(),
        require_moderation: false,
    }
}

fn harness_with(repos: Repositories) -> Harness {
    let hub = Arc::new(RealtimeHub::new());
    let mailer = Arc::new(RecordingMailer::default());
    let services = PlatformServices::build(&repos, hub.clone(), mailer.clone(), settings()).unwrap();
    Harness {
        repos,
        services,
        hub,
        mailer,
    }
}

fn harness_with_down_publisher() -> Harness {
    let repos = Repositories::in_memory();
    let hub = Arc::new(RealtimeHub::new());
    let mailer = Arc::new(RecordingMailer::default());
    let services = PlatformServices::build_with_publisher(
        &repos,
        hub.clone(),
        Arc::new(DownPublisher),
        mailer.clone(),
        settings(),
    )
    .unwrap();
    Harness {
        repos,
        services,
        hub,
        mailer,
    }
}

fn harness() -> Harness {
    harness_with(Repositories::in_memory())
}

fn harness_failing_for(users: &[&str]) -> (Harness, Arc<FlakyNotifications>) {
    let mut repos = Repositories::in_memory();
    let flaky = Arc::new(FlakyNotifications {
        inner: repos.notifications.clone(),
        failing: users.iter().map(|u| u.to_string()).collect(),
        attempts: Mutex::new(Vec::new()),
    });
    repos.notifications = flaky.clone();
    (harness_with(repos), flaky)
}

async fn add_user(h: &Harness, id: &str, role: UserRole) -> AuthContext {
    let mut user = User::new(id, &format!("{}@example.com", id), "not-a-real-hash")
        .with_role(role)
        .verified();
    user.id = id.to_string();
    h.repos.users.insert(&user).await.unwrap();
    AuthContext {
        user_id: user.id,
        role,
        username: user.username,
        email: user.email,
    }
}

fn new_event(capacity: u32) -> NewEvent {
    NewEvent {
        title: "Rust Meetup".to_string(),
        description: "Monthly gathering of Rustaceans".to_string(),
        date: Utc::now() + Duration::days(14),
        location: "Berlin".to_string(),
        capacity,
        category: EventCategory::Technology,
    }
}

async fn create_event(h: &Harness, creator: &AuthContext, capacity: u32) -> Event {
    h.services.events.create(creator, new_event(capacity)).await.unwrap()
}

mod registration_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_never_exceed_capacity() {
        let h = harness();
        let creator = add_user(&h, "creator", UserRole::User).await;
        let event = create_event(&h, &creator, 5).await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let events = h.services.events.clone();
            let event_id = event.id.clone();
            handles.push(tokio::spawn(async move {
                events.register(&event_id, &format!("user-{}", i)).await
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(PlatformError::Conflict { message }) => assert_eq!(message, "Event is full"),
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(accepted, 5);

        let stored = h.services.events.get(&event.id).await.unwrap();
        assert_eq!(stored.attendees.len(), 5);
        let unique: HashSet<&String> = stored.attendees.iter().collect();
        assert_eq!(unique.len(), 5);

        h.services.tasks.wait_idle().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_registration_admits_once() {
        let h = harness();
        let creator = add_user(&h, "creator", UserRole::User).await;
        let event = create_event(&h, &creator, 10).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let events = h.services.events.clone();
            let event_id = event.id.clone();
            handles.push(tokio::spawn(async move { events.register(&event_id, "same-user").await }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(h.services.events.get(&event.id).await.unwrap().attendees, vec!["same-user"]);
    }

    #[tokio::test]
    async fn test_register_then_unregister_round_trip() {
        let h = harness();
        let creator = add_user(&h, "creator", UserRole::User).await;
        let attendee = add_user(&h, "alice", UserRole::User).await;
        let event = create_event(&h, &creator, 3).await;

        let after = h.services.events.register(&event.id, &attendee.user_id).await.unwrap();
        assert_eq!(after.attendees, vec!["alice"]);

        let after = h.services.events.unregister(&event.id, &attendee.user_id).await.unwrap();
        assert!(after.attendees.is_empty());

        let err = h.services.events.unregister(&event.id, &attendee.user_id).await.unwrap_err();
        assert!(matches!(err, PlatformError::InvalidState { .. }));

        h.services.events.register(&event.id, &attendee.user_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_capacity_one() {
        let h = harness();
        let creator = add_user(&h, "creator", UserRole::User).await;
        let event = create_event(&h, &creator, 1).await;

        h.services.events.register(&event.id, "a").await.unwrap();

        let err = h.services.events.register(&event.id, "b").await.unwrap_err();
        assert!(matches!(err, PlatformError::Conflict { ref message } if message == "Event is full"));

        let err = h.services.events.register(&event.id, "a").await.unwrap_err();
        assert!(matches!(err, PlatformError::Conflict { ref message } if message.contains("already")));

        let after = h.services.events.unregister(&event.id, "a").await.unwrap();
        assert!(after.attendees.is_empty());

        let after = h.services.events.register(&event.id, "b").await.unwrap();
        assert_eq!(after.attendees, vec!["b"]);

        h.services.tasks.wait_idle().await;
    }

    #[tokio::test]
    async fn test_details_list_attendees_in_registration_order() {
        let h = harness();
        let creator = add_user(&h, "creator", UserRole::User).await;
        add_user(&h, "a", UserRole::User).await;
        add_user(&h, "b", UserRole::User).await;
        let event = create_event(&h, &creator, 5).await;

        h.services.events.register(&event.id, "b").await.unwrap();
        h.services.events.register(&event.id, "a").await.unwrap();
        h.services.tasks.wait_idle().await;

        let details = h.services.events.get_details(&event.id, None).await.unwrap();
        let ids: Vec<&str> = details.attendees.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_unapproved_event_rejects_registration() {
        let h = harness();
        let event = Event::new(new_event(10), "creator", EventStatus::Pending);
        h.repos.events.insert(&event).await.unwrap();

        let err = h.services.events.register(&event.id, "alice").await.unwrap_err();
        assert!(matches!(err, PlatformError::InvalidState { .. }));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_event() {
        let h = harness();
        let err = h.services.events.register("missing", "alice").await.unwrap_err();
        assert!(matches!(err, PlatformError::NotFound { .. }));
    }
}

mod side_effect_tests {
    use super::*;

    #[tokio::test]
    async fn test_registration_notifies_and_emails_both_parties() {
        let h = harness();
        let creator = add_user(&h, "creator", UserRole::User).await;
        let attendee = add_user(&h, "alice", UserRole::User).await;
        let event = create_event(&h, &creator, 3).await;

        let (conn, mut frames) = h.hub.connect();
        h.hub.join(conn, &user_room(&attendee.user_id));

        h.services.events.register(&event.id, &attendee.user_id).await.unwrap();
        h.services.tasks.wait_idle().await;

        let mine = h.services.notifications.list_for_user("alice").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].notification_type, NotificationType::EventRegistration);
        assert_eq!(mine[0].related_event.as_deref(), Some(event.id.as_str()));

        let theirs = h.services.notifications.list_for_user("creator").await.unwrap();
        assert_eq!(theirs.len(), 1);
        assert!(theirs[0].message.contains("alice"));

        let mut recipients = h.mailer.recipients();
        recipients.sort();
        assert_eq!(recipients, vec!["alice@example.com", "creator@example.com"]);

        let frame = frames.recv().await.unwrap();
        assert_eq!(frame.event, NEW_NOTIFICATION);
        assert_eq!(frame.payload["user"], "alice");
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_undo_registration() {
        let (h, flaky) = harness_failing_for(&["alice"]);
        let creator = add_user(&h, "creator", UserRole::User).await;
        let event = create_event(&h, &creator, 3).await;

        let result = h.services.events.register(&event.id, "alice").await;
        assert!(result.is_ok());
        h.services.tasks.wait_idle().await;

        assert!(h.services.events.get(&event.id).await.unwrap().is_attendee("alice"));
        assert!(flaky.attempts().contains(&"alice".to_string()));
        assert_eq!(h.services.notifications.list_for_user("creator").await.unwrap().len(), 1);
        assert!(h.services.notifications.list_for_user("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_failure_keeps_stored_notifications_and_messages() {
        let h = harness_with_down_publisher();
        let creator = add_user(&h, "creator", UserRole::User).await;
        let attendee = add_user(&h, "alice", UserRole::User).await;
        let event = create_event(&h, &creator, 3).await;

        h.services.events.register(&event.id, &attendee.user_id).await.unwrap();
        h.services.tasks.wait_idle().await;

        let mine = h.services.notifications.list_for_user("alice").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(h.services.notifications.list_for_user("creator").await.unwrap().len(), 1);
        assert_eq!(h.mailer.recipients().len(), 2);

        let posted = h.services.chat.post(&attendee, &event.id, "  see you there  ").await.unwrap();
        assert_eq!(posted.message.content, "see you there");
        let history = h.services.chat.history(&creator, &event.id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_notifies_each_attendee_once_despite_failure() {
        let (h, flaky) = harness_failing_for(&["a"]);
        let creator = add_user(&h, "creator", UserRole::User).await;
        let event = create_event(&h, &creator, 5).await;
        h.repos.events.add_attendee(&event.id, "a").await.unwrap();
        h.repos.events.add_attendee(&event.id, "b").await.unwrap();

        h.services.events.delete(&creator, &event.id).await.unwrap();

        assert_eq!(flaky.attempts(), vec!["a", "b"]);
        assert!(h.repos.events.find_by_id(&event.id).await.unwrap().is_none());

        let notices = h.services.notifications.list_for_user("b").await.unwrap();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_delete_requires_owner_or_admin() {
        let h = harness();
        let creator = add_user(&h, "creator", UserRole::User).await;
        let stranger = add_user(&h, "stranger", UserRole::User).await;
        let admin = add_user(&h, "admin", UserRole::Admin).await;
        let event = create_event(&h, &creator, 5).await;

        let err = h.services.events.delete(&stranger, &event.id).await.unwrap_err();
        assert!(matches!(err, PlatformError::Forbidden { .. }));

        h.services.events.delete(&admin, &event.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_notifies_attendees_and_guards_capacity() {
        let h = harness();
        let creator = add_user(&h, "creator", UserRole::User).await;
        let event = create_event(&h, &creator, 3).await;
        h.services.events.register(&event.id, "a").await.unwrap();
        h.services.events.register(&event.id, "b").await.unwrap();
        h.services.tasks.wait_idle().await;

        let shrink = eh_platform::domain::EventChanges {
            capacity: Some(1),
            ..Default::default()
        };
        let err = h.services.events.update(&creator, &event.id, shrink).await.unwrap_err();
        assert!(matches!(err, PlatformError::Conflict { .. }));

        let rename = eh_platform::domain::EventChanges {
            title: Some("Rust Meetup (moved)".to_string()),
            ..Default::default()
        };
        let updated = h.services.events.update(&creator, &event.id, rename).await.unwrap();
        assert_eq!(updated.title, "Rust Meetup (moved)");
        h.services.tasks.wait_idle().await;

        for user in ["a", "b"] {
            let notices = h.services.notifications.list_for_user(user).await.unwrap();
            assert!(notices
                .iter()
                .any(|n| n.notification_type == NotificationType::EventUpdate));
        }
    }
}

mod moderation_tests {
    use super::*;

    #[tokio::test]
    async fn test_moderated_events_start_pending() {
        let repos = Repositories::in_memory();
        let hub = Arc::new(RealtimeHub::new());
        let mut settings = settings();
        settings.require_moderation = true;
        let services =
            PlatformServices::build(&repos, hub, Arc::new(RecordingMailer::default()), settings)
                .unwrap();

        let h = Harness {
            repos,
            services,
            hub: Arc::new(RealtimeHub::new()),
            mailer: Arc::new(RecordingMailer::default()),
        };
        let creator = add_user(&h, "creator", UserRole::User).await;
        let admin = add_user(&h, "admin", UserRole::Admin).await;

        let pending = create_event(&h, &creator, 5).await;
        assert_eq!(pending.status, EventStatus::Pending);
        assert!(h.services.events.get_details(&pending.id, None).await.is_err());
        assert!(h.services.events.get_details(&pending.id, Some(&creator)).await.is_ok());

        let approved = h
            .services
            .events
            .moderate(&admin, &pending.id, EventStatus::Approved, None)
            .await
            .unwrap();
        assert_eq!(approved.status, EventStatus::Approved);
        assert_eq!(approved.moderated_by.as_deref(), Some("admin"));

        h.services.events.register(&pending.id, "alice").await.unwrap();
        assert_eq!(create_event(&h, &admin, 5).await.status, EventStatus::Approved);
    }
}

mod report_tests {
    use super::*;

    #[tokio::test]
    async fn test_report_escalates_to_admins() {
        let h = harness();
        let creator = add_user(&h, "creator", UserRole::User).await;
        let reporter = add_user(&h, "reporter", UserRole::User).await;
        add_user(&h, "admin1", UserRole::Admin).await;
        add_user(&h, "admin2", UserRole::Admin).await;
        let event = create_event(&h, &creator, 5).await;

        let report = h
            .services
            .reports
            .create(&reporter, &event.id, "Spam listing")
            .await
            .unwrap();
        h.services.tasks.wait_idle().await;

        for admin in ["admin1", "admin2"] {
            let notices = h.services.notifications.list_for_user(admin).await.unwrap();
            assert_eq!(notices.len(), 1);
            assert_eq!(notices[0].notification_type, NotificationType::EventReport);
            assert_eq!(notices[0].related_report.as_deref(), Some(report.id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_report_requires_fields() {
        let h = harness();
        let reporter = add_user(&h, "reporter", UserRole::User).await;
        let err = h.services.reports.create(&reporter, "", "  ").await.unwrap_err();
        assert!(matches!(err, PlatformError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_double_resolve_conflicts_and_keeps_first_resolution() {
        let h = harness();
        let creator = add_user(&h, "creator", UserRole::User).await;
        let reporter = add_user(&h, "reporter", UserRole::User).await;
        let admin = add_user(&h, "admin", UserRole::Admin).await;
        let event = create_event(&h, &creator, 5).await;

        let report = h
            .services
            .reports
            .create(&reporter, &event.id, "Misleading description")
            .await
            .unwrap();

        let first = h.services.reports.resolve(&admin, &report.id).await.unwrap();
        assert!(first.is_resolved());
        assert_eq!(first.resolver.as_deref(), Some("admin"));

        let err = h.services.reports.resolve(&admin, &report.id).await.unwrap_err();
        assert!(matches!(err, PlatformError::Conflict { .. }));

        let stored = h.repos.reports.find_by_id(&report.id).await.unwrap().unwrap();
        assert_eq!(stored.resolved_at, first.resolved_at);

        h.services.tasks.wait_idle().await;
        let notices = h.services.notifications.list_for_user("reporter").await.unwrap();
        assert_eq!(
            notices
                .iter()
                .filter(|n| n.notification_type == NotificationType::ReportUpdate)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_non_admin_cannot_resolve() {
        let h = harness();
        let creator = add_user(&h, "creator", UserRole::User).await;
        let event = create_event(&h, &creator, 5).await;
        let report = h.services.reports.create(&creator, &event.id, "Test").await.unwrap();

        let err = h.services.reports.resolve(&creator, &report.id).await.unwrap_err();
        assert!(matches!(err, PlatformError::Forbidden { .. }));
    }
}
