use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::pipeline::status::{OpportunityStatus, UnknownStatus};
use crate::sources::JobSource;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OpportunityRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub url: String,
    pub description: String,
    /// 0.0 – 1.0, set once the opportunity has been scored.
    pub fit_score: Option<f64>,
    pub parsed_jd: Option<Value>,
    pub status: String,
    pub discovered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OpportunityRow {
    pub fn status(&self) -> Result<OpportunityStatus, UnknownStatus> {
        self.status.parse()
    }
}

/// Insert payload for an opportunity. Identity is `(user_id, url, title, company)`.
#[derive(Debug, Clone)]
pub struct NewOpportunity {
    pub user_id: Uuid,
    pub source: JobSource,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub url: String,
    pub description: String,
}
