//! Axum route handlers for the jobs and applications API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::{ApplicationRow, FollowupRow};
use crate::models::opportunity::OpportunityRow;
use crate::pipeline::orchestrator::{ApplicationStats, DailySummary, ManualJob};
use crate::pipeline::status::ApplicationStatus;
use crate::sources::SearchCriteria;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub user_id: Uuid,
    /// Overrides the stored criteria for this run only.
    #[serde(default)]
    pub criteria: Option<SearchCriteria>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub job: ManualJob,
    #[serde(default)]
    pub auto_submit: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub user_id: Uuid,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub user_id: Uuid,
    pub approved: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub user_id: Uuid,
    pub status: ApplicationStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationDetailResponse {
    pub application: ApplicationRow,
    pub opportunity: Option<OpportunityRow>,
    pub followups: Vec<FollowupRow>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationStatusResponse {
    pub id: Uuid,
    pub status: String,
    pub approval_deadline: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub confirmation_number: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationListResponse {
    pub applications: Vec<ApplicationRow>,
    pub count: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/jobs/auto-search
///
/// Starts a daily search in the background and returns immediately.
pub async fn handle_auto_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state.pipeline.load_user(request.user_id).await?;

    let pipeline = state.pipeline.clone();
    let user_id = request.user_id;
    tokio::spawn(async move {
        match pipeline.run_daily_search(user_id, request.criteria).await {
            Ok(summary) => info!(
                "Background search for user {user_id}: {} drafted, {} submitted",
                summary.drafted, summary.submitted
            ),
            Err(e) => error!("Background search for user {user_id} failed: {e}"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "user_id": user_id })),
    ))
}

/// POST /api/v1/jobs/search
pub async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<DailySummary>, AppError> {
    let summary = state
        .pipeline
        .run_daily_search(request.user_id, request.criteria)
        .await?;
    Ok(Json(summary))
}

/// POST /api/v1/jobs/apply
pub async fn handle_apply(
    State(state): State<AppState>,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<ApplicationRow>, AppError> {
    let application = state
        .pipeline
        .apply_to_specific_job(request.user_id, request.job, request.auto_submit)
        .await?;
    Ok(Json(application))
}

/// GET /api/v1/applications?user_id=&status=&limit=
pub async fn handle_list_applications(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApplicationListResponse>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ApplicationStatus>)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let applications = state
        .pipeline
        .list_applications(query.user_id, status, query.limit)
        .await?;
    Ok(Json(ApplicationListResponse {
        count: applications.len(),
        applications,
    }))
}

/// GET /api/v1/applications/stats?user_id=
pub async fn handle_stats(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApplicationStats>, AppError> {
    Ok(Json(state.pipeline.stats(query.user_id).await?))
}

/// GET /api/v1/applications/:id?user_id=
pub async fn handle_get_application(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApplicationDetailResponse>, AppError> {
    let application = state
        .pipeline
        .get_application(query.user_id, application_id)
        .await?;
    let opportunity = state
        .pipeline
        .store
        .get_opportunity(application.opportunity_id)
        .await?;
    let followups = state.pipeline.store.followups_for(application.id).await?;

    Ok(Json(ApplicationDetailResponse {
        application,
        opportunity,
        followups,
    }))
}

/// GET /api/v1/applications/:id/status?user_id=
pub async fn handle_get_status(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApplicationStatusResponse>, AppError> {
    let application = state
        .pipeline
        .get_application(query.user_id, application_id)
        .await?;
    Ok(Json(ApplicationStatusResponse {
        id: application.id,
        status: application.status,
        approval_deadline: application.approval_deadline,
        submitted_at: application.submitted_at,
        confirmation_number: application.confirmation_number,
        updated_at: application.updated_at,
    }))
}

/// POST /api/v1/applications/:id/approve
///
/// `approved: false` rejects the application. Over-quota approvals answer 429 and
/// stay approved until the scheduler can submit them.
pub async fn handle_approve(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<ApprovalRequest>,
) -> Result<Json<ApplicationRow>, AppError> {
    let application = state
        .pipeline
        .decide_approval(
            request.user_id,
            application_id,
            request.approved,
            request.notes,
        )
        .await?;
    Ok(Json(application))
}

/// POST /api/v1/applications/:id/retry
pub async fn handle_retry(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<UserQuery>,
) -> Result<Json<ApplicationRow>, AppError> {
    let application = state
        .pipeline
        .retry_failed(request.user_id, application_id)
        .await?;
    Ok(Json(application))
}

/// PATCH /api/v1/applications/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<ApplicationRow>, AppError> {
    let application = state
        .pipeline
        .update_tracking_status(
            request.user_id,
            application_id,
            request.status,
            request.notes,
        )
        .await?;
    Ok(Json(application))
}
