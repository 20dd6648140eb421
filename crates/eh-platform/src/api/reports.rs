//! Reports API
//!
//! Any verified user can report an event; admins review and resolve.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::common::{PageLimits, PaginatedResponse, PaginationParams};
use crate::api::middleware::{AdminOnly, Authenticated};
use crate::domain::Report;
use crate::error::PlatformError;
use crate::service::ReportService;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    pub event_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub id: String,
    pub event: String,
    pub reporter: String,
    pub reason: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Report> for ReportResponse {
    fn from(r: Report) -> Self {
        Self {
            id: r.id,
            event: r.event,
            reporter: r.reporter,
            reason: r.reason,
            status: r.status.as_str().to_string(),
            resolver: r.resolver,
            resolved_at: r.resolved_at.map(|t| t.to_rfc3339()),
            created_at: r.created_at.to_rfc3339(),
            updated_at: r.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct ReportsState {
    pub reports: Arc<ReportService>,
    pub limits: PageLimits,
}

pub async fn create_report(
    State(state): State<ReportsState>,
    auth: Authenticated,
    Json(req): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<ReportResponse>), PlatformError> {
    let report = state
        .reports
        .create(
            &auth.0,
            req.event_id.as_deref().unwrap_or_default(),
            req.reason.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(report.into())))
}

/// All reports, newest first
pub async fn list_reports(
    State(state): State<ReportsState>,
    admin: AdminOnly,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<ReportResponse>>, PlatformError> {
    let page = params.resolve(state.limits);
    let (reports, total) = state
        .reports
        .list(&admin.0, page.offset(), page.limit as u64)
        .await?;
    let data = reports.into_iter().map(ReportResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, page, total)))
}

pub async fn resolve_report(
    State(state): State<ReportsState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ReportResponse>, PlatformError> {
    let report = state.reports.resolve(&auth.0, &id).await?;
    Ok(Json(report.into()))
}

pub fn reports_router(state: ReportsState) -> Router {
    Router::new()
        .route("/", post(create_report))
        .route("/all", get(list_reports))
        .route("/:id/resolve", put(resolve_report))
        .with_state(state)
}
