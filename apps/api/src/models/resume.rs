use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A user's base resume. Exactly one row per user has `is_current = true`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub summary: Option<String>,
    pub skills: Vec<String>,
    /// Structured sections (experience, education, ...) as supplied by the user.
    pub content: Value,
    pub raw_text: Option<String>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

impl ResumeRow {
    /// Flattens the resume into the plain text handed to LLM prompts and text matching.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        if let Some(summary) = &self.summary {
            text.push_str(summary);
            text.push_str("\n\n");
        }
        if !self.skills.is_empty() {
            text.push_str("Skills: ");
            text.push_str(&self.skills.join(", "));
            text.push_str("\n\n");
        }
        match &self.raw_text {
            Some(raw) => text.push_str(raw),
            None if !self.content.is_null() => {
                if let Ok(pretty) = serde_json::to_string_pretty(&self.content) {
                    text.push_str(&pretty);
                }
            }
            None => {}
        }
        text.trim_end().to_string()
    }
}
