//! Background scheduler: one tick every `SCHEDULER_TICK_SECS`.
//!
//! Tick order: expire approvals → reap stale submission claims → submit approved
//! applications → dispatch due follow-ups → daily searches. A failing step is
//! logged and the next one still runs.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::errors::AppError;
use crate::models::application::ApplicationPatch;
use crate::pipeline::followups::{dispatch_due, DispatchReport};
use crate::pipeline::notify::{notify_quietly, Notification};
use crate::pipeline::orchestrator::JobApplicationPipeline;
use crate::pipeline::status::ApplicationStatus;

/// A `submitting` claim older than this is assumed abandoned.
pub const STALE_CLAIM_MINUTES: i64 = 15;
const BATCH: i64 = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub expired: usize,
    pub reaped: usize,
    pub submitted: usize,
    pub followups: DispatchReport,
    pub searches: usize,
}

pub fn spawn(pipeline: Arc<JobApplicationPipeline>) -> JoinHandle<()> {
    let period = StdDuration::from_secs(pipeline.config.scheduler_tick_secs.max(1));
    info!("Scheduler started (tick every {}s)", period.as_secs());

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let report = pipeline.tick(Utc::now()).await;
            debug!("Scheduler tick: {report:?}");
        }
    })
}

impl JobApplicationPipeline {
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        match self.expire_stale_approvals(now).await {
            Ok(n) => report.expired = n,
            Err(e) => error!("Scheduler: expiring approvals failed: {e}"),
        }
        match self.reap_stale_submissions(now).await {
            Ok(n) => report.reaped = n,
            Err(e) => error!("Scheduler: reaping stale submissions failed: {e}"),
        }
        match self.submit_approved().await {
            Ok(n) => report.submitted = n,
            Err(e) => error!("Scheduler: submitting approved applications failed: {e}"),
        }
        match dispatch_due(self.store.as_ref(), self.notifier.as_ref(), now, BATCH).await {
            Ok(dispatched) => report.followups = dispatched,
            Err(e) => error!("Scheduler: dispatching follow-ups failed: {e}"),
        }
        match self.run_scheduled_searches(now.date_naive()).await {
            Ok(n) => report.searches = n,
            Err(e) => error!("Scheduler: daily searches failed: {e}"),
        }

        report
    }

    /// Rejects applications nobody approved in time.
    pub async fn expire_stale_approvals(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let mut expired = 0;
        for application in self.store.expired_approvals(now, BATCH).await? {
            let id = application.id;
            match self.expire_approval(application).await {
                Ok(_) => expired += 1,
                Err(AppError::InvalidTransition(_)) => {
                    debug!("Application {id} was decided while expiring")
                }
                Err(e) => warn!("Expiring application {id} failed: {e}"),
            }
        }
        Ok(expired)
    }

    /// Fails claims whose submitter never reported back. These are not resubmitted:
    /// the packet may already have gone out.
    pub async fn reap_stale_submissions(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let cutoff = now - Duration::minutes(STALE_CLAIM_MINUTES);
        let mut reaped = 0;
        for application in self.store.stale_submissions(cutoff, BATCH).await? {
            let failed = match self
                .store
                .transition_application(
                    application.id,
                    ApplicationStatus::Submitting,
                    ApplicationStatus::Failed,
                    ApplicationPatch {
                        notes: Some("submission outcome unknown".to_string()),
                        ..Default::default()
                    },
                )
                .await
            {
                Ok(failed) => failed,
                Err(AppError::InvalidTransition(_)) => continue,
                Err(e) => {
                    warn!("Reaping application {} failed: {e}", application.id);
                    continue;
                }
            };
            warn!(
                "Application {} stuck in submitting since {}; marked failed",
                failed.id, application.updated_at
            );

            let company = match self.store.get_opportunity(failed.opportunity_id).await {
                Ok(Some(opportunity)) => opportunity.company,
                _ => String::new(),
            };
            notify_quietly(
                self.notifier.as_ref(),
                failed.user_id,
                Notification::SubmissionFailed {
                    application_id: failed.id,
                    company,
                    reason: "submission outcome unknown".to_string(),
                },
            )
            .await;
            reaped += 1;
        }
        Ok(reaped)
    }

    /// Submits approved applications; those over quota stay approved for a later tick.
    pub async fn submit_approved(&self) -> Result<usize, AppError> {
        let mut submitted = 0;
        for application in self.store.approved_applications(BATCH).await? {
            let id = application.id;
            match self.submit(application).await {
                Ok(done) if done.status == ApplicationStatus::Submitted.as_str() => submitted += 1,
                Ok(_) => {}
                Err(AppError::RateLimited { .. }) => debug!("Application {id} waits for quota"),
                Err(AppError::InvalidTransition(_)) => debug!("Application {id} claimed elsewhere"),
                Err(e) => warn!("Submitting application {id} failed: {e}"),
            }
        }
        Ok(submitted)
    }

    /// Runs the daily search for every auto-apply user not yet searched on `today`.
    pub async fn run_scheduled_searches(&self, today: NaiveDate) -> Result<usize, AppError> {
        let mut runs = 0;
        for user in self.store.auto_apply_users().await? {
            if !self.store.claim_daily_run(user.id, today).await? {
                continue;
            }
            runs += 1;
            match self.run_daily_search(user.id, None).await {
                Ok(summary) => info!(
                    "Scheduled search for user {}: {} drafted, {} submitted",
                    user.id, summary.drafted, summary.submitted
                ),
                Err(e) => warn!("Scheduled search for user {} failed: {e}", user.id),
            }
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::orchestrator::ManualJob;
    use crate::pipeline::store::PipelineStore;
    use crate::pipeline::testing::{approval_config, auto_apply_config, listing, FakeBoard, Harness};
    use crate::sources::{JobBoard, JobSource};
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    fn job(company: &str) -> ManualJob {
        ManualJob {
            job_url: format!("https://{}.example/jobs/1", company.to_lowercase()),
            company: company.to_string(),
            title: "Backend Engineer".to_string(),
            description: "rust postgres".to_string(),
            location: None,
        }
    }

    async fn pending_app(h: &Harness, user: Uuid) -> Uuid {
        h.pipeline
            .apply_to_specific_job(user, job("Acme"), false)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_tick_expires_overdue_approvals() {
        let h = Harness::new(approval_config(), vec![]);
        let user = h.seed_user(false, None);
        let id = pending_app(&h, user).await;
        h.store.force_application(id, |a| {
            a.approval_deadline = Some(Utc::now() - Duration::hours(1))
        });

        let report = h.pipeline.tick(Utc::now()).await;
        assert_eq!(report.expired, 1);

        let app = h.store.get_application(id).await.unwrap().unwrap();
        assert_eq!(app.status, "rejected");
        assert_eq!(app.notes.as_deref(), Some("approval window elapsed"));
        assert_eq!(h.store.opportunities()[0].status, "rejected");
    }

    #[tokio::test]
    async fn test_late_approval_is_refused() {
        let h = Harness::new(approval_config(), vec![]);
        let user = h.seed_user(false, None);
        let id = pending_app(&h, user).await;
        h.store.force_application(id, |a| {
            a.approval_deadline = Some(Utc::now() - Duration::minutes(5))
        });

        let err = h
            .pipeline
            .decide_approval(user, id, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        assert_eq!(h.submitter.calls.load(Ordering::SeqCst), 0);
        let app = h.store.get_application(id).await.unwrap().unwrap();
        assert_eq!(app.status, "rejected");
    }

    #[tokio::test]
    async fn test_tick_fails_abandoned_claims_without_resubmitting() {
        let h = Harness::new(approval_config(), vec![]);
        let user = h.seed_user(false, None);
        let id = pending_app(&h, user).await;
        h.store.force_application(id, |a| {
            a.status = "submitting".to_string();
            a.updated_at = Utc::now() - Duration::minutes(STALE_CLAIM_MINUTES + 5);
        });

        let report = h.pipeline.tick(Utc::now()).await;
        assert_eq!(report.reaped, 1);
        assert_eq!(report.submitted, 0);

        let app = h.store.get_application(id).await.unwrap().unwrap();
        assert_eq!(app.status, "failed");
        assert_eq!(app.notes.as_deref(), Some("submission outcome unknown"));
        assert_eq!(h.submitter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recent_claims_are_left_alone() {
        let h = Harness::new(approval_config(), vec![]);
        let user = h.seed_user(false, None);
        let id = pending_app(&h, user).await;
        h.store.force_application(id, |a| a.status = "submitting".to_string());

        assert_eq!(h.pipeline.reap_stale_submissions(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tick_submits_approved_applications() {
        let h = Harness::new(approval_config(), vec![]);
        let user = h.seed_user(false, None);
        let id = pending_app(&h, user).await;
        h.store.force_application(id, |a| a.status = "approved".to_string());

        let report = h.pipeline.tick(Utc::now()).await;
        assert_eq!(report.submitted, 1);
        let app = h.store.get_application(id).await.unwrap().unwrap();
        assert_eq!(app.status, "submitted");
    }

    #[tokio::test]
    async fn test_followups_sent_once_and_cancelled_when_closed() {
        let h = Harness::new(approval_config(), vec![]);
        let user = h.seed_user(false, None);
        let id = pending_app(&h, user).await;
        h.pipeline.decide_approval(user, id, true, None).await.unwrap();

        let followups = h.store.followups();
        assert_eq!(followups.len(), 3);
        h.store.force_followup(followups[0].id, |f| {
            f.due_at = Utc::now() - Duration::minutes(1)
        });

        let first = h.pipeline.tick(Utc::now()).await;
        assert_eq!(first.followups.sent, 1);
        let second = h.pipeline.tick(Utc::now()).await;
        assert_eq!(second.followups.sent, 0);
        assert_eq!(h.notifier.count("followup_due"), 1);

        // Closed applications get their remaining reminders cancelled, not sent.
        h.store.force_application(id, |a| a.status = "rejected".to_string());
        h.store.force_followup(followups[1].id, |f| {
            f.due_at = Utc::now() - Duration::minutes(1)
        });
        let third = h.pipeline.tick(Utc::now()).await;
        assert_eq!(third.followups.sent, 0);
        assert_eq!(third.followups.cancelled, 2);
        assert_eq!(h.notifier.count("followup_due"), 1);
    }

    #[tokio::test]
    async fn test_scheduled_search_runs_once_per_day_for_auto_apply_users() {
        let board = Arc::new(FakeBoard::new(
            JobSource::Indeed,
            vec![listing(JobSource::Indeed, "Backend Engineer", "Acme", "rust postgres")],
        ));
        let boards: Vec<Arc<dyn JobBoard>> = vec![board.clone()];
        let h = Harness::new(auto_apply_config(), boards);
        let auto_user = h.seed_user(true, None);
        h.seed_user(false, None);

        let now = Utc::now();
        let first = h.pipeline.tick(now).await;
        let second = h.pipeline.tick(now).await;

        assert_eq!(first.searches, 1);
        assert_eq!(second.searches, 0);
        assert_eq!(board.searches.load(Ordering::SeqCst), 1);

        let apps = h.store.applications();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].user_id, auto_user);
        assert_eq!(apps[0].status, "submitted");
    }
}
