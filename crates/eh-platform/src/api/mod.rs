//! API Layer
//!
//! REST endpoints under `/api`, the `/ws` live channel and the
//! operational endpoints.

pub mod common;
pub mod middleware;

pub mod admin;
pub mod auth;
pub mod events;
pub mod notifications;
pub mod realtime;
pub mod reports;

use std::time::Instant;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Extension, Router,
};
use chrono::Utc;
use serde_json::json;

pub use common::*;
pub use middleware::{AdminOnly, AppState, Authenticated, OptionalAuth};

pub use admin::{admin_router, AdminState};
pub use auth::{accounts_router, AccountsState};
pub use events::{events_router, EventsState};
pub use notifications::{notifications_router, NotificationsState};
pub use realtime::realtime_router;
pub use reports::{reports_router, ReportsState};

use crate::service::PlatformServices;

/// Build the full application router
pub fn create_router(services: PlatformServices, limits: PageLimits) -> Router {
    let app_state = AppState {
        auth_service: services.auth.clone(),
        authz_service: services.authz.clone(),
    };
    let started = Instant::now();

    Router::new()
        .route("/", get(welcome))
        .route(
            "/health",
            get(move || async move {
                Json(json!({
                    "status": "ok",
                    "timestamp": Utc::now().to_rfc3339(),
                    "uptimeSeconds": started.elapsed().as_secs(),
                }))
            }),
        )
        .nest(
            "/api/auth",
            accounts_router(AccountsState {
                accounts: services.accounts.clone(),
            }),
        )
        .nest(
            "/api/events",
            events_router(EventsState {
                events: services.events.clone(),
                chat: services.chat.clone(),
                limits,
            }),
        )
        .nest(
            "/api/notifications",
            notifications_router(NotificationsState {
                notifications: services.notifications.clone(),
            }),
        )
        .nest(
            "/api/reports",
            reports_router(ReportsState {
                reports: services.reports.clone(),
                limits,
            }),
        )
        .nest(
            "/api/admin",
            admin_router(AdminState {
                admin: services.admin.clone(),
                events: services.events.clone(),
            }),
        )
        .merge(realtime_router(services.hub.clone()))
        .fallback(not_found)
        .layer(Extension(app_state))
}

async fn welcome() -> Json<serde_json::Value> {
    Json(json!({ "msg": "Welcome to the EventHub API" }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError {
            error: "NOT_FOUND".to_string(),
            message: "Route not found".to_string(),
            details: None,
        }),
    )
}
