//! User notifications: approval requests, submission outcomes, reminders and
//! daily digests, published as JSON on the user's Redis channel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipeline::orchestrator::DailySummary;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    ApprovalRequested {
        application_id: Uuid,
        company: String,
        title: String,
        url: String,
        deadline: DateTime<Utc>,
    },
    Submitted {
        application_id: Uuid,
        company: String,
        title: String,
        confirmation_number: Option<String>,
    },
    SubmissionFailed {
        application_id: Uuid,
        company: String,
        reason: String,
    },
    FollowupDue {
        application_id: Uuid,
        message: String,
    },
    DailySummary(DailySummary),
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::ApprovalRequested { .. } => "approval_requested",
            Notification::Submitted { .. } => "submitted",
            Notification::SubmissionFailed { .. } => "submission_failed",
            Notification::FollowupDue { .. } => "followup_due",
            Notification::DailySummary(_) => "daily_summary",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: Uuid, notification: Notification) -> Result<(), AppError>;
}

/// Sends a notification; a failure is logged and swallowed so it never undoes pipeline work.
pub async fn notify_quietly(notifier: &dyn Notifier, user_id: Uuid, notification: Notification) {
    let kind = notification.kind();
    if let Err(e) = notifier.notify(user_id, notification).await {
        warn!("Failed to send {kind} notification to user {user_id}: {e}");
    }
}

pub fn channel(user_id: Uuid) -> String {
    format!("notifications:{user_id}")
}

pub struct RedisNotifier {
    conn: MultiplexedConnection,
}

impl RedisNotifier {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify(&self, user_id: Uuid, notification: Notification) -> Result<(), AppError> {
        let payload = serde_json::to_string(&notification)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize notification: {e}")))?;
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(channel(user_id), payload).await?;
        info!(
            "Published {} notification to user {} ({} receivers)",
            notification.kind(),
            user_id,
            receivers
        );
        Ok(())
    }
}
