use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::pipeline::status::{ApplicationStatus, UnknownStatus};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub opportunity_id: Uuid,
    pub status: String,
    pub tailored_resume: Option<Value>,
    pub cover_letter: Option<String>,
    pub packet_s3_key: Option<String>,
    pub confirmation_number: Option<String>,
    pub submission_method: Option<String>,
    pub approval_deadline: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub response_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRow {
    pub fn status(&self) -> Result<ApplicationStatus, UnknownStatus> {
        self.status.parse()
    }

    pub fn has_materials(&self) -> bool {
        self.tailored_resume.is_some()
            && self
                .cover_letter
                .as_deref()
                .map(|c| !c.trim().is_empty())
                .unwrap_or(false)
    }
}

/// Column updates that ride along with a status compare-and-set.
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ApplicationPatch {
    pub notes: Option<String>,
    pub approval_deadline: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub confirmation_number: Option<String>,
    pub submission_method: Option<String>,
    pub response_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FollowupRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub user_id: Uuid,
    pub offset_days: i32,
    pub due_at: DateTime<Utc>,
    pub message: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
