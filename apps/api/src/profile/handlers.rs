//! Axum route handlers for users and their profile.

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::ResumeRow;
use crate::models::user::UserRow;
use crate::profile::{
    ensure_user, normalize_skills, parse_skills_field, replace_current_resume, validate_criteria,
    NewResume,
};
use crate::sources::SearchCriteria;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub auto_apply_enabled: bool,
    #[serde(default)]
    pub search_criteria: Option<SearchCriteria>,
}

#[derive(Debug, Deserialize)]
pub struct CriteriaRequest {
    pub user_id: Uuid,
    pub criteria: SearchCriteria,
}

#[derive(Debug, Serialize)]
pub struct CriteriaResponse {
    pub user_id: Uuid,
    pub criteria: SearchCriteria,
}

#[derive(Debug, Deserialize)]
pub struct AutoApplyRequest {
    pub user_id: Uuid,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub user_id: Uuid,
    #[serde(default = "default_resume_title")]
    pub title: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub content: Value,
    pub raw_text: Option<String>,
}

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

fn default_resume_title() -> String {
    "Base resume".to_string()
}

fn criteria_json(criteria: &SearchCriteria) -> Result<Value, AppError> {
    serde_json::to_value(criteria)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize criteria: {e}")))
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/users
pub async fn handle_create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserRow>), AppError> {
    let email = request.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::Validation(format!("'{email}' is not an email address")));
    }
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    let criteria = match &request.search_criteria {
        Some(criteria) => {
            validate_criteria(criteria)?;
            Some(criteria_json(criteria)?)
        }
        None => None,
    };

    let user = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (id, email, name, auto_apply_enabled, search_criteria)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(request.name.trim())
    .bind(request.auto_apply_enabled)
    .bind(criteria)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Validation(format!("{email} is already registered")))?;

    info!("Created user {}", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /api/v1/profile/criteria
pub async fn handle_put_criteria(
    State(state): State<AppState>,
    Json(request): Json<CriteriaRequest>,
) -> Result<Json<CriteriaResponse>, AppError> {
    validate_criteria(&request.criteria)?;

    let updated = sqlx::query("UPDATE users SET search_criteria = $2 WHERE id = $1")
        .bind(request.user_id)
        .bind(criteria_json(&request.criteria)?)
        .execute(&state.db)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User {} not found",
            request.user_id
        )));
    }

    Ok(Json(CriteriaResponse {
        user_id: request.user_id,
        criteria: request.criteria,
    }))
}

/// PATCH /api/v1/profile/auto-apply
pub async fn handle_toggle_auto_apply(
    State(state): State<AppState>,
    Json(request): Json<AutoApplyRequest>,
) -> Result<Json<UserRow>, AppError> {
    let user = sqlx::query_as::<_, UserRow>(
        "UPDATE users SET auto_apply_enabled = $2 WHERE id = $1 RETURNING *",
    )
    .bind(request.user_id)
    .bind(request.enabled)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User {} not found", request.user_id)))?;

    if request.enabled && !state.config.pipeline.allows_auto_submit(true) {
        info!(
            "User {} enabled auto-apply; submissions still need approval under current settings",
            user.id
        );
    }
    Ok(Json(user))
}

/// POST /api/v1/profile/resume
pub async fn handle_put_resume(
    State(state): State<AppState>,
    Json(request): Json<ResumeRequest>,
) -> Result<Json<ResumeRow>, AppError> {
    let resume = NewResume {
        title: request.title,
        summary: request.summary.filter(|s| !s.trim().is_empty()),
        skills: normalize_skills(&request.skills),
        content: request.content,
        raw_text: request.raw_text,
    };
    let row = replace_current_resume(&state.db, request.user_id, resume).await?;
    Ok(Json(row))
}

/// POST /api/v1/profile/resume/pdf
///
/// Multipart fields: `user_id`, `file` (PDF), optional `title` and `skills`
/// (comma-separated).
pub async fn handle_upload_resume_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ResumeRow>, AppError> {
    let mut user_id: Option<Uuid> = None;
    let mut title: Option<String> = None;
    let mut skills: Vec<String> = Vec::new();
    let mut pdf: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                pdf = Some(field.bytes().await.map_err(|e| {
                    AppError::Validation(format!("Could not read uploaded file: {e}"))
                })?);
            }
            other => {
                let text = field.text().await.map_err(|e| {
                    AppError::Validation(format!("Could not read field '{other}': {e}"))
                })?;
                match other {
                    "user_id" => {
                        user_id = Some(text.trim().parse().map_err(|_| {
                            AppError::Validation(format!("'{text}' is not a valid user_id"))
                        })?)
                    }
                    "title" => title = Some(text.trim().to_string()).filter(|t| !t.is_empty()),
                    "skills" => skills = parse_skills_field(&text),
                    _ => {}
                }
            }
        }
    }

    let user_id =
        user_id.ok_or_else(|| AppError::Validation("user_id field is required".to_string()))?;
    let pdf = pdf.ok_or_else(|| AppError::Validation("file field is required".to_string()))?;
    ensure_user(&state.db, user_id).await?;

    let raw_text = extract_pdf_text(pdf).await?;
    info!(
        "Extracted {} characters from resume PDF for user {user_id}",
        raw_text.len()
    );

    let resume = NewResume {
        title: title.unwrap_or_else(default_resume_title),
        summary: None,
        skills,
        content: json!({ "source": "pdf" }),
        raw_text: Some(raw_text),
    };
    let row = replace_current_resume(&state.db, user_id, resume).await?;
    Ok(Json(row))
}

/// GET /api/v1/profile/resume?user_id=
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ResumeRow>, AppError> {
    let resume = sqlx::query_as::<_, ResumeRow>(
        "SELECT * FROM resumes WHERE user_id = $1 AND is_current",
    )
    .bind(params.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| {
        AppError::NotFound(format!("No resume on file for user {}", params.user_id))
    })?;
    Ok(Json(resume))
}

/// PDF extraction is CPU-bound, so it runs on the blocking pool. A panic inside
/// the extractor surfaces as an internal error rather than taking the worker down.
async fn extract_pdf_text(bytes: Bytes) -> Result<String, AppError> {
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| {
            AppError::Internal(anyhow::anyhow!("spawn_blocking failed in PDF extraction: {e}"))
        })?
        .map_err(|e| AppError::UnprocessableEntity(format!("Could not read PDF: {e}")))?;
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::UnprocessableEntity(
            "PDF contains no extractable text".to_string(),
        ));
    }
    Ok(text)
}
