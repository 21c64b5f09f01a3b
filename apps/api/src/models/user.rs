use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub auto_apply_enabled: bool,
    /// Stored `SearchCriteria`; `None` falls back to defaults.
    pub search_criteria: Option<Value>,
    /// UTC day of the last scheduled search, claimed before the run starts.
    pub last_search_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}
