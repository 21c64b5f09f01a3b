//! Persisted pipeline state behind the `PipelineStore` seam.
//!
//! Every status change is a compare-and-set on the expected current status; a lost
//! race comes back as `AppError::InvalidTransition`, never as a silent overwrite.
//! Inserts are idempotent on the natural keys enforced by the schema.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::{ApplicationPatch, ApplicationRow, FollowupRow};
use crate::models::opportunity::{NewOpportunity, OpportunityRow};
use crate::models::resume::ResumeRow;
use crate::models::user::UserRow;
use crate::pipeline::status::{ApplicationStatus, OpportunityStatus};

#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRow>, AppError>;
    async fn auto_apply_users(&self) -> Result<Vec<UserRow>, AppError>;
    /// Marks `day` as searched for the user. False when it was already claimed.
    async fn claim_daily_run(&self, user_id: Uuid, day: NaiveDate) -> Result<bool, AppError>;
    async fn current_resume(&self, user_id: Uuid) -> Result<Option<ResumeRow>, AppError>;

    /// Returns the stored row and whether this call inserted it.
    async fn upsert_opportunity(
        &self,
        new: NewOpportunity,
    ) -> Result<(OpportunityRow, bool), AppError>;
    async fn get_opportunity(&self, id: Uuid) -> Result<Option<OpportunityRow>, AppError>;
    async fn record_fit(
        &self,
        id: Uuid,
        fit_score: f64,
        parsed_jd: Value,
    ) -> Result<OpportunityRow, AppError>;
    async fn transition_opportunity(
        &self,
        id: Uuid,
        from: OpportunityStatus,
        to: OpportunityStatus,
    ) -> Result<OpportunityRow, AppError>;

    /// Creates the draft for an opportunity, or returns the one that already exists.
    async fn insert_draft(
        &self,
        user_id: Uuid,
        opportunity_id: Uuid,
    ) -> Result<ApplicationRow, AppError>;
    async fn application_for_opportunity(
        &self,
        opportunity_id: Uuid,
    ) -> Result<Option<ApplicationRow>, AppError>;
    async fn get_application(&self, id: Uuid) -> Result<Option<ApplicationRow>, AppError>;
    /// Only drafts accept new materials.
    async fn save_materials(
        &self,
        id: Uuid,
        tailored_resume: Value,
        cover_letter: String,
        packet_s3_key: Option<String>,
    ) -> Result<ApplicationRow, AppError>;
    async fn transition_application(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
        patch: ApplicationPatch,
    ) -> Result<ApplicationRow, AppError>;
    async fn list_applications(
        &self,
        user_id: Uuid,
        status: Option<ApplicationStatus>,
        limit: i64,
    ) -> Result<Vec<ApplicationRow>, AppError>;
    async fn status_counts(&self, user_id: Uuid) -> Result<Vec<(String, i64)>, AppError>;
    async fn expired_approvals(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ApplicationRow>, AppError>;
    async fn stale_submissions(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ApplicationRow>, AppError>;
    async fn approved_applications(&self, limit: i64) -> Result<Vec<ApplicationRow>, AppError>;

    /// False when a reminder for this offset already exists.
    async fn schedule_followup(
        &self,
        application: &ApplicationRow,
        offset_days: u32,
        due_at: DateTime<Utc>,
        message: String,
    ) -> Result<bool, AppError>;
    async fn followups_for(&self, application_id: Uuid) -> Result<Vec<FollowupRow>, AppError>;
    async fn due_followups(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FollowupRow>, AppError>;
    /// False when the reminder was already sent or cancelled.
    async fn mark_followup_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError>;
    async fn cancel_followups(
        &self,
        application_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;
}

pub fn guard_application(
    id: Uuid,
    from: ApplicationStatus,
    to: ApplicationStatus,
) -> Result<(), AppError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "application {id} cannot move from {from} to {to}"
        )))
    }
}

pub fn guard_opportunity(
    id: Uuid,
    from: OpportunityStatus,
    to: OpportunityStatus,
) -> Result<(), AppError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "opportunity {id} cannot move from {from} to {to}"
        )))
    }
}

pub fn lost_race(kind: &str, id: Uuid, from: &str, to: &str) -> AppError {
    AppError::InvalidTransition(format!(
        "{kind} {id} is no longer {from}; refusing to move it to {to}"
    ))
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineStore for PgStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRow>, AppError> {
        Ok(
            sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn auto_apply_users(&self) -> Result<Vec<UserRow>, AppError> {
        Ok(sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE auto_apply_enabled ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn claim_daily_run(&self, user_id: Uuid, day: NaiveDate) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET last_search_on = $2
            WHERE id = $1 AND (last_search_on IS NULL OR last_search_on < $2)
            "#,
        )
        .bind(user_id)
        .bind(day)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn current_resume(&self, user_id: Uuid) -> Result<Option<ResumeRow>, AppError> {
        Ok(sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resumes WHERE user_id = $1 AND is_current",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn upsert_opportunity(
        &self,
        new: NewOpportunity,
    ) -> Result<(OpportunityRow, bool), AppError> {
        let inserted = sqlx::query_as::<_, OpportunityRow>(
            r#"
            INSERT INTO opportunities
                (id, user_id, source, title, company, location, url, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, url, title, company) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.source.as_str())
        .bind(&new.title)
        .bind(&new.company)
        .bind(&new.location)
        .bind(&new.url)
        .bind(&new.description)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row, true));
        }

        let existing = sqlx::query_as::<_, OpportunityRow>(
            r#"
            SELECT * FROM opportunities
            WHERE user_id = $1 AND url = $2 AND title = $3 AND company = $4
            "#,
        )
        .bind(new.user_id)
        .bind(&new.url)
        .bind(&new.title)
        .bind(&new.company)
        .fetch_one(&self.pool)
        .await?;
        Ok((existing, false))
    }

    async fn get_opportunity(&self, id: Uuid) -> Result<Option<OpportunityRow>, AppError> {
        Ok(
            sqlx::query_as::<_, OpportunityRow>("SELECT * FROM opportunities WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn record_fit(
        &self,
        id: Uuid,
        fit_score: f64,
        parsed_jd: Value,
    ) -> Result<OpportunityRow, AppError> {
        sqlx::query_as::<_, OpportunityRow>(
            r#"
            UPDATE opportunities
            SET fit_score = $2, parsed_jd = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(fit_score.clamp(0.0, 1.0))
        .bind(parsed_jd)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Opportunity {id} not found")))
    }

    async fn transition_opportunity(
        &self,
        id: Uuid,
        from: OpportunityStatus,
        to: OpportunityStatus,
    ) -> Result<OpportunityRow, AppError> {
        guard_opportunity(id, from, to)?;
        sqlx::query_as::<_, OpportunityRow>(
            r#"
            UPDATE opportunities SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| lost_race("opportunity", id, from.as_str(), to.as_str()))
    }

    async fn insert_draft(
        &self,
        user_id: Uuid,
        opportunity_id: Uuid,
    ) -> Result<ApplicationRow, AppError> {
        let inserted = sqlx::query_as::<_, ApplicationRow>(
            r#"
            INSERT INTO applications (id, user_id, opportunity_id, status)
            VALUES ($1, $2, $3, 'draft')
            ON CONFLICT (opportunity_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(opportunity_id)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok(row),
            None => self
                .application_for_opportunity(opportunity_id)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!(
                        "application for opportunity {opportunity_id} vanished after conflict"
                    ))
                }),
        }
    }

    async fn application_for_opportunity(
        &self,
        opportunity_id: Uuid,
    ) -> Result<Option<ApplicationRow>, AppError> {
        Ok(sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE opportunity_id = $1",
        )
        .bind(opportunity_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn get_application(&self, id: Uuid) -> Result<Option<ApplicationRow>, AppError> {
        Ok(
            sqlx::query_as::<_, ApplicationRow>("SELECT * FROM applications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn save_materials(
        &self,
        id: Uuid,
        tailored_resume: Value,
        cover_letter: String,
        packet_s3_key: Option<String>,
    ) -> Result<ApplicationRow, AppError> {
        sqlx::query_as::<_, ApplicationRow>(
            r#"
            UPDATE applications
            SET tailored_resume = $2,
                cover_letter = $3,
                packet_s3_key = COALESCE($4, packet_s3_key),
                updated_at = NOW()
            WHERE id = $1 AND status = 'draft'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tailored_resume)
        .bind(cover_letter)
        .bind(packet_s3_key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| lost_race("application", id, "draft", "draft"))
    }

    async fn transition_application(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
        patch: ApplicationPatch,
    ) -> Result<ApplicationRow, AppError> {
        guard_application(id, from, to)?;
        sqlx::query_as::<_, ApplicationRow>(
            r#"
            UPDATE applications
            SET status = $3,
                notes = COALESCE($4, notes),
                approval_deadline = COALESCE($5, approval_deadline),
                submitted_at = COALESCE($6, submitted_at),
                confirmation_number = COALESCE($7, confirmation_number),
                submission_method = COALESCE($8, submission_method),
                response_at = COALESCE($9, response_at),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(patch.notes)
        .bind(patch.approval_deadline)
        .bind(patch.submitted_at)
        .bind(patch.confirmation_number)
        .bind(patch.submission_method)
        .bind(patch.response_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| lost_race("application", id, from.as_str(), to.as_str()))
    }

    async fn list_applications(
        &self,
        user_id: Uuid,
        status: Option<ApplicationStatus>,
        limit: i64,
    ) -> Result<Vec<ApplicationRow>, AppError> {
        Ok(sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT * FROM applications
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(status.map(ApplicationStatus::as_str))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn status_counts(&self, user_id: Uuid) -> Result<Vec<(String, i64)>, AppError> {
        Ok(sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM applications WHERE user_id = $1 GROUP BY status",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn expired_approvals(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ApplicationRow>, AppError> {
        Ok(sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT * FROM applications
            WHERE status = 'pending_approval' AND approval_deadline < $1
            ORDER BY approval_deadline
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn stale_submissions(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ApplicationRow>, AppError> {
        Ok(sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT * FROM applications
            WHERE status = 'submitting' AND updated_at < $1
            ORDER BY updated_at
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn approved_applications(&self, limit: i64) -> Result<Vec<ApplicationRow>, AppError> {
        Ok(sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE status = 'approved' ORDER BY updated_at LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn schedule_followup(
        &self,
        application: &ApplicationRow,
        offset_days: u32,
        due_at: DateTime<Utc>,
        message: String,
    ) -> Result<bool, AppError> {
        let offset = i32::try_from(offset_days)
            .map_err(|_| AppError::Validation(format!("follow-up offset {offset_days} too large")))?;
        let result = sqlx::query(
            r#"
            INSERT INTO followups (id, application_id, user_id, offset_days, due_at, message)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (application_id, offset_days) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(application.id)
        .bind(application.user_id)
        .bind(offset)
        .bind(due_at)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn followups_for(&self, application_id: Uuid) -> Result<Vec<FollowupRow>, AppError> {
        Ok(sqlx::query_as::<_, FollowupRow>(
            "SELECT * FROM followups WHERE application_id = $1 ORDER BY offset_days",
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn due_followups(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FollowupRow>, AppError> {
        Ok(sqlx::query_as::<_, FollowupRow>(
            r#"
            SELECT * FROM followups
            WHERE sent_at IS NULL AND cancelled_at IS NULL AND due_at <= $1
            ORDER BY due_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn mark_followup_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE followups SET sent_at = $2
            WHERE id = $1 AND sent_at IS NULL AND cancelled_at IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn cancel_followups(
        &self,
        application_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE followups SET cancelled_at = $2
            WHERE application_id = $1 AND sent_at IS NULL AND cancelled_at IS NULL
            "#,
        )
        .bind(application_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
