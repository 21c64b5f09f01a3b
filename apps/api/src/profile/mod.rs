//! Profile: users, their search criteria, and the base resume every application
//! is tailored from.

use std::collections::HashSet;

use serde_json::Value;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::ResumeRow;
use crate::sources::SearchCriteria;

pub mod handlers;

/// A base resume as submitted, before it is stored.
#[derive(Debug, Clone)]
pub struct NewResume {
    pub title: String,
    pub summary: Option<String>,
    pub skills: Vec<String>,
    pub content: Value,
    pub raw_text: Option<String>,
}

/// Trims, lowercases and de-duplicates skills, keeping first-seen order.
pub fn normalize_skills<I, S>(skills: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    skills
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Splits a comma- or newline-separated skills field.
pub fn parse_skills_field(raw: &str) -> Vec<String> {
    normalize_skills(raw.split([',', '\n']))
}

pub fn validate_criteria(criteria: &SearchCriteria) -> Result<(), AppError> {
    if criteria.keywords.trim().is_empty() {
        return Err(AppError::Validation(
            "Search keywords cannot be empty".to_string(),
        ));
    }
    if !(criteria.search_indeed || criteria.search_linkedin || criteria.search_glassdoor) {
        return Err(AppError::Validation(
            "Enable at least one job board".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_resume(resume: &NewResume) -> Result<(), AppError> {
    let has_text = resume
        .raw_text
        .as_deref()
        .map(|t| !t.trim().is_empty())
        .unwrap_or(false);
    let has_content = match &resume.content {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    };
    if !has_text && !has_content && resume.skills.is_empty() {
        return Err(AppError::Validation(
            "Resume needs text, structured content, or skills".to_string(),
        ));
    }
    Ok(())
}

pub async fn ensure_user(pool: &PgPool, user_id: Uuid) -> Result<(), AppError> {
    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    exists
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
}

/// Stores a new base resume and makes it the user's current one.
pub async fn replace_current_resume(
    pool: &PgPool,
    user_id: Uuid,
    resume: NewResume,
) -> Result<ResumeRow, AppError> {
    validate_resume(&resume)?;
    ensure_user(pool, user_id).await?;

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE resumes SET is_current = FALSE WHERE user_id = $1 AND is_current")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query_as::<_, ResumeRow>(
        r#"
        INSERT INTO resumes (id, user_id, title, summary, skills, content, raw_text, is_current)
        VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&resume.title)
    .bind(&resume.summary)
    .bind(&resume.skills)
    .bind(&resume.content)
    .bind(&resume.raw_text)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Stored resume {} for user {user_id} ({} skills)",
        row.id,
        row.skills.len()
    );
    Ok(row)
}
