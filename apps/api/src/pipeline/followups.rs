//! Follow-up reminders: scheduled when an application is submitted, dispatched
//! once each when due, cancelled when the application reaches a final status.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::application::ApplicationRow;
use crate::pipeline::notify::{notify_quietly, Notification, Notifier};
use crate::pipeline::store::PipelineStore;

pub fn followup_message(company: &str) -> String {
    format!("Follow up on application to {company}")
}

/// `(offset_days, due_at)` for each configured offset.
pub fn followup_plan(submitted_at: DateTime<Utc>, offsets: &[u32]) -> Vec<(u32, DateTime<Utc>)> {
    offsets
        .iter()
        .map(|&days| (days, submitted_at + Duration::days(i64::from(days))))
        .collect()
}

/// Returns how many reminders were newly created; existing offsets are left alone.
pub async fn schedule_followups(
    store: &dyn PipelineStore,
    application: &ApplicationRow,
    company: &str,
    offsets: &[u32],
) -> Result<usize, AppError> {
    let submitted_at = application.submitted_at.unwrap_or_else(Utc::now);
    let mut created = 0;
    for (days, due_at) in followup_plan(submitted_at, offsets) {
        if store
            .schedule_followup(application, days, due_at, followup_message(company))
            .await?
        {
            created += 1;
        }
    }
    info!(
        "Scheduled {created} follow-up(s) for application {}",
        application.id
    );
    Ok(created)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub cancelled: u64,
}

/// Sends every due reminder at most once. Reminders whose application is gone or
/// final are cancelled instead.
pub async fn dispatch_due(
    store: &dyn PipelineStore,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
    batch: i64,
) -> Result<DispatchReport, AppError> {
    let mut report = DispatchReport::default();

    for followup in store.due_followups(now, batch).await? {
        let live = match store.get_application(followup.application_id).await? {
            Some(application) => match application.status() {
                Ok(status) => !status.is_terminal(),
                Err(e) => {
                    warn!("Skipping follow-up {}: {e}", followup.id);
                    continue;
                }
            },
            None => false,
        };

        if !live {
            report.cancelled += store.cancel_followups(followup.application_id, now).await?;
            continue;
        }

        if store.mark_followup_sent(followup.id, now).await? {
            notify_quietly(
                notifier,
                followup.user_id,
                Notification::FollowupDue {
                    application_id: followup.application_id,
                    message: followup.message.clone(),
                },
            )
            .await;
            report.sent += 1;
        }
    }

    Ok(report)
}
