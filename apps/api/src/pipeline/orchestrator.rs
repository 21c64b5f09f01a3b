//! JobApplicationPipeline: moves opportunities from search to submission.
//!
//! Flow per opportunity: parse JD → fit score → tailor resume → cover letter →
//! archive packet → approval (or auto-submit) → rate-limited hand-off → follow-ups.
//!
//! Nothing here blocks on a human. An application waiting for approval is parked in
//! `pending_approval` and resumed by `decide_approval`; every other entry point is
//! driven by the application's current status, so calling it again resumes rather
//! than repeats.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::errors::AppError;
use crate::matching::fit_scoring::FitScorer;
use crate::matching::jd_parser::ParsedJD;
use crate::materials::packet::{render_packet, PacketArchive};
use crate::materials::JobAgent;
use crate::models::application::{ApplicationPatch, ApplicationRow};
use crate::models::opportunity::OpportunityRow;
use crate::models::resume::ResumeRow;
use crate::models::user::UserRow;
use crate::pipeline::followups::schedule_followups;
use crate::pipeline::notify::{notify_quietly, Notification, Notifier};
use crate::pipeline::rate_limit::RateLimiter;
use crate::pipeline::status::{ApplicationStatus, OpportunityStatus};
use crate::pipeline::store::PipelineStore;
use crate::pipeline::submit::Submitter;
use crate::sources::{dedupe_listings, JobBoard, JobListing, JobSource, SearchCriteria};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of one daily search run, also sent to the user as a digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummary {
    pub opportunities_found: usize,
    pub opportunities_new: usize,
    pub skipped_low_fit: usize,
    /// Applications whose materials were prepared in this run.
    pub drafted: usize,
    pub pending_approval: usize,
    pub submitted: usize,
    pub failed: usize,
    /// The daily quota stopped work in this run.
    pub rate_limited: bool,
    pub application_ids: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl DailySummary {
    fn new() -> Self {
        Self {
            opportunities_found: 0,
            opportunities_new: 0,
            skipped_low_fit: 0,
            drafted: 0,
            pending_approval: 0,
            submitted: 0,
            failed: 0,
            rate_limited: false,
            application_ids: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn record(&mut self, application: &ApplicationRow) {
        self.drafted += 1;
        self.application_ids.push(application.id);
        match application.status() {
            Ok(ApplicationStatus::PendingApproval) => self.pending_approval += 1,
            Ok(ApplicationStatus::Submitted) => self.submitted += 1,
            Ok(ApplicationStatus::Failed) => self.failed += 1,
            // Approved but not handed off: the quota ran out mid-run.
            Ok(ApplicationStatus::Approved) => self.rate_limited = true,
            _ => {}
        }
    }
}

/// A job the user found themselves.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualJob {
    pub job_url: String,
    pub company: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStats {
    pub total_applications: i64,
    pub by_status: BTreeMap<String, i64>,
    pub submitted: i64,
    pub pending_approval: i64,
    pub submitted_today: u32,
    pub daily_limit: u32,
    pub remaining_today: u32,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Every collaborator sits behind a trait object so the flow can run against fakes.
pub struct JobApplicationPipeline {
    pub store: Arc<dyn PipelineStore>,
    pub boards: Vec<Arc<dyn JobBoard>>,
    pub agent: Arc<dyn JobAgent>,
    pub scorer: Arc<dyn FitScorer>,
    pub submitter: Arc<dyn Submitter>,
    pub limiter: Arc<dyn RateLimiter>,
    pub notifier: Arc<dyn Notifier>,
    pub archive: Arc<dyn PacketArchive>,
    pub config: PipelineConfig,
}

pub fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn clamp_list_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT)
}

/// Ranks by fit descending (ties keep discovery order) and splits off those below `min_fit`.
pub fn rank_by_fit(
    mut opportunities: Vec<OpportunityRow>,
    min_fit: f64,
) -> (Vec<OpportunityRow>, Vec<OpportunityRow>) {
    opportunities.sort_by(|a, b| {
        let a = a.fit_score.unwrap_or(0.0);
        let b = b.fit_score.unwrap_or(0.0);
        b.total_cmp(&a)
    });
    opportunities
        .into_iter()
        .partition(|o| o.fit_score.unwrap_or(0.0) >= min_fit)
}

impl JobApplicationPipeline {
    // ── Entry points ────────────────────────────────────────────────────────

    /// Searches, scores and processes today's best opportunities for one user.
    pub async fn run_daily_search(
        &self,
        user_id: Uuid,
        criteria_override: Option<SearchCriteria>,
    ) -> Result<DailySummary, AppError> {
        let user = self.load_user(user_id).await?;
        let resume = self.load_resume(user_id).await?;
        let criteria = criteria_override.unwrap_or_else(|| self.stored_criteria(&user));
        let limit = self.daily_limit(&criteria);
        let used = self.limiter.used(user_id, utc_today()).await?;
        let remaining = limit.saturating_sub(used);

        let mut summary = DailySummary::new();
        info!(
            "Daily search for user {user_id}: limit={limit} used={used} keywords={:?}",
            criteria.keywords
        );

        if remaining == 0 {
            info!("User {user_id} already reached today's limit of {limit}; nothing to do");
            summary.rate_limited = true;
            self.send_summary(user_id, &summary).await;
            return Ok(summary);
        }

        let listings = dedupe_listings(self.search_boards(&criteria).await);
        summary.opportunities_found = listings.len();

        let mut scored = Vec::new();
        for listing in listings {
            let (opportunity, inserted) = self
                .store
                .upsert_opportunity(listing.into_new_opportunity(user_id))
                .await?;
            if inserted {
                summary.opportunities_new += 1;
            }
            if opportunity.status()?.is_terminal()
                || self
                    .store
                    .application_for_opportunity(opportunity.id)
                    .await?
                    .is_some()
            {
                continue;
            }
            let opportunity_id = opportunity.id;
            match self.score_opportunity(&resume, opportunity).await {
                Ok(opportunity) => scored.push(opportunity),
                Err(e) => {
                    warn!("Scoring opportunity {opportunity_id} failed: {e}");
                    summary.failed += 1;
                }
            }
        }

        let (qualified, low_fit) = rank_by_fit(scored, self.config.min_fit_score);
        summary.skipped_low_fit = low_fit.len();
        info!(
            "User {user_id}: {} qualified, {} below fit threshold {}",
            qualified.len(),
            low_fit.len(),
            self.config.min_fit_score
        );

        let auto_submit = self.config.allows_auto_submit(user.auto_apply_enabled);
        for opportunity in qualified.into_iter().take(remaining as usize) {
            let opportunity_id = opportunity.id;
            match self
                .process_opportunity(&user, &resume, opportunity, auto_submit)
                .await
            {
                Ok(application) => summary.record(&application),
                Err(e) => {
                    error!("Processing opportunity {opportunity_id} failed: {e}");
                    summary.failed += 1;
                }
            }
        }

        summary.timestamp = Utc::now();
        info!(
            "Daily search for user {user_id} done: found={} new={} drafted={} pending={} submitted={} failed={}",
            summary.opportunities_found,
            summary.opportunities_new,
            summary.drafted,
            summary.pending_approval,
            summary.submitted,
            summary.failed
        );
        self.send_summary(user_id, &summary).await;
        Ok(summary)
    }

    /// Applies to a job the user supplied. Calling it again for the same job resumes
    /// the existing application.
    pub async fn apply_to_specific_job(
        &self,
        user_id: Uuid,
        job: ManualJob,
        auto_submit: bool,
    ) -> Result<ApplicationRow, AppError> {
        for (field, value) in [
            ("job_url", &job.job_url),
            ("company", &job.company),
            ("title", &job.title),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{field} cannot be empty")));
            }
        }

        let user = self.load_user(user_id).await?;
        let resume = self.load_resume(user_id).await?;

        let honoured = auto_submit && user.auto_apply_enabled && !self.config.require_approval;
        if auto_submit && !honoured {
            info!(
                "Auto-submit requested by user {user_id} but not permitted; using approval flow"
            );
        }

        let listing = JobListing {
            source: JobSource::Manual,
            title: job.title.trim().to_string(),
            company: job.company.trim().to_string(),
            location: job.location,
            url: job.job_url.trim().to_string(),
            description: job.description,
        };
        let (opportunity, _) = self
            .store
            .upsert_opportunity(listing.into_new_opportunity(user_id))
            .await?;

        let opportunity = if self
            .store
            .application_for_opportunity(opportunity.id)
            .await?
            .is_some()
        {
            opportunity
        } else {
            self.score_opportunity(&resume, opportunity).await?
        };
        self.process_opportunity(&user, &resume, opportunity, honoured)
            .await
    }

    /// Drives one opportunity as far as it can go without a human.
    pub async fn process_opportunity(
        &self,
        user: &UserRow,
        resume: &ResumeRow,
        opportunity: OpportunityRow,
        auto_submit: bool,
    ) -> Result<ApplicationRow, AppError> {
        let application = match self
            .store
            .application_for_opportunity(opportunity.id)
            .await?
        {
            Some(application) => application,
            None => {
                let opportunity_status = opportunity.status()?;
                if opportunity_status.is_terminal() {
                    return Err(AppError::InvalidTransition(format!(
                        "opportunity {} is already {opportunity_status}",
                        opportunity.id
                    )));
                }
                self.move_opportunity(&opportunity, OpportunityStatus::Applying)
                    .await?;
                let draft = self.store.insert_draft(user.id, opportunity.id).await?;
                info!(
                    "Draft application {} created for {} at {}",
                    draft.id, opportunity.title, opportunity.company
                );
                draft
            }
        };

        match application.status()? {
            ApplicationStatus::Draft => {
                let application = if application.has_materials() {
                    application
                } else {
                    self.prepare_materials(resume, &opportunity, application)
                        .await?
                };
                if auto_submit {
                    let approved = self
                        .store
                        .transition_application(
                            application.id,
                            ApplicationStatus::Draft,
                            ApplicationStatus::Approved,
                            ApplicationPatch {
                                notes: Some("auto-approved".to_string()),
                                ..Default::default()
                            },
                        )
                        .await?;
                    self.submit_or_queue(approved).await
                } else {
                    self.request_approval(application, &opportunity).await
                }
            }
            ApplicationStatus::Approved => self.submit_or_queue(application).await,
            _ => Ok(application),
        }
    }

    /// Hands an approved application off, spending one of the user's daily permits.
    pub async fn submit(&self, application: ApplicationRow) -> Result<ApplicationRow, AppError> {
        let status = application.status()?;
        if status != ApplicationStatus::Approved {
            return Err(AppError::InvalidTransition(format!(
                "application {} is {status}; only approved applications can be submitted",
                application.id
            )));
        }
        if !application.has_materials() {
            return Err(AppError::Validation(format!(
                "application {} has no tailored resume or cover letter",
                application.id
            )));
        }

        let user = self.load_user(application.user_id).await?;
        let opportunity = self.load_opportunity(application.opportunity_id).await?;
        let limit = self.daily_limit(&self.stored_criteria(&user));
        let day = utc_today();

        if !self.limiter.try_acquire(user.id, day, limit).await? {
            info!(
                "Application {} stays approved: user {} reached {limit} submissions today",
                application.id, user.id
            );
            return Err(AppError::RateLimited { limit });
        }

        let claimed = match self
            .store
            .transition_application(
                application.id,
                ApplicationStatus::Approved,
                ApplicationStatus::Submitting,
                ApplicationPatch::default(),
            )
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                self.release_permit(user.id, day).await;
                return Err(e);
            }
        };

        info!(
            "Submitting application {} to {} ({})",
            claimed.id, opportunity.company, opportunity.source
        );

        match self.submitter.submit(&claimed, &opportunity).await {
            Ok(receipt) => {
                let submitted = self
                    .store
                    .transition_application(
                        claimed.id,
                        ApplicationStatus::Submitting,
                        ApplicationStatus::Submitted,
                        ApplicationPatch {
                            submitted_at: Some(Utc::now()),
                            confirmation_number: receipt.confirmation_number.clone(),
                            submission_method: Some(receipt.method.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;

                if let Err(e) = self
                    .move_opportunity(&opportunity, OpportunityStatus::Applied)
                    .await
                {
                    warn!("Opportunity {} not marked applied: {e}", opportunity.id);
                }
                if let Err(e) = schedule_followups(
                    self.store.as_ref(),
                    &submitted,
                    &opportunity.company,
                    &self.config.followup_days,
                )
                .await
                {
                    warn!("Follow-ups for application {} not scheduled: {e}", submitted.id);
                }
                notify_quietly(
                    self.notifier.as_ref(),
                    user.id,
                    Notification::Submitted {
                        application_id: submitted.id,
                        company: opportunity.company.clone(),
                        title: opportunity.title.clone(),
                        confirmation_number: receipt.confirmation_number,
                    },
                )
                .await;
                info!("Application {} submitted via {}", submitted.id, receipt.method);
                Ok(submitted)
            }
            Err(e) => {
                error!("Submission of application {} failed: {e}", claimed.id);
                self.release_permit(user.id, day).await;
                let failed = self
                    .store
                    .transition_application(
                        claimed.id,
                        ApplicationStatus::Submitting,
                        ApplicationStatus::Failed,
                        ApplicationPatch {
                            notes: Some(format!("submission failed: {e}")),
                            ..Default::default()
                        },
                    )
                    .await?;
                notify_quietly(
                    self.notifier.as_ref(),
                    user.id,
                    Notification::SubmissionFailed {
                        application_id: failed.id,
                        company: opportunity.company.clone(),
                        reason: e.to_string(),
                    },
                )
                .await;
                Ok(failed)
            }
        }
    }

    /// Records the user's approval decision. Repeating a decision is a no-op.
    pub async fn decide_approval(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        approved: bool,
        notes: Option<String>,
    ) -> Result<ApplicationRow, AppError> {
        let application = self.owned_application(user_id, application_id).await?;
        let status = application.status()?;

        if status == ApplicationStatus::PendingApproval
            && application
                .approval_deadline
                .map(|deadline| deadline < Utc::now())
                .unwrap_or(false)
        {
            self.expire_approval(application).await?;
            return Err(AppError::InvalidTransition(format!(
                "approval window for application {application_id} has elapsed"
            )));
        }

        if approved {
            match status {
                ApplicationStatus::PendingApproval => {
                    let approved = self
                        .store
                        .transition_application(
                            application_id,
                            ApplicationStatus::PendingApproval,
                            ApplicationStatus::Approved,
                            ApplicationPatch {
                                notes,
                                ..Default::default()
                            },
                        )
                        .await?;
                    info!("Application {application_id} approved by user {user_id}");
                    self.submit(approved).await
                }
                ApplicationStatus::Approved => self.submit(application).await,
                s if s.is_submitted_or_later() => Ok(application),
                s => Err(AppError::InvalidTransition(format!(
                    "application {application_id} is {s} and cannot be approved"
                ))),
            }
        } else {
            match status {
                ApplicationStatus::PendingApproval => {
                    let rejected = self
                        .store
                        .transition_application(
                            application_id,
                            ApplicationStatus::PendingApproval,
                            ApplicationStatus::Rejected,
                            ApplicationPatch {
                                notes,
                                ..Default::default()
                            },
                        )
                        .await?;
                    self.reject_opportunity(rejected.opportunity_id).await;
                    info!("Application {application_id} rejected by user {user_id}");
                    Ok(rejected)
                }
                ApplicationStatus::Rejected => Ok(application),
                s => Err(AppError::InvalidTransition(format!(
                    "application {application_id} is {s} and cannot be rejected"
                ))),
            }
        }
    }

    /// `failed → approved`, then submit.
    pub async fn retry_failed(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<ApplicationRow, AppError> {
        let application = self.owned_application(user_id, application_id).await?;
        let status = application.status()?;
        if status != ApplicationStatus::Failed {
            return Err(AppError::InvalidTransition(format!(
                "application {application_id} is {status}; only failed applications can be retried"
            )));
        }
        if !application.has_materials() {
            return Err(AppError::Validation(format!(
                "application {application_id} cannot be retried: its materials were never generated"
            )));
        }

        let approved = self
            .store
            .transition_application(
                application_id,
                ApplicationStatus::Failed,
                ApplicationStatus::Approved,
                ApplicationPatch::default(),
            )
            .await?;
        info!("Retrying application {application_id} for user {user_id}");
        self.submit(approved).await
    }

    /// Records post-submission progress reported by the user.
    pub async fn update_tracking_status(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        status: ApplicationStatus,
        notes: Option<String>,
    ) -> Result<ApplicationRow, AppError> {
        if !status.is_tracking() {
            return Err(AppError::Validation(format!(
                "'{status}' is not a status that can be reported"
            )));
        }

        let application = self.owned_application(user_id, application_id).await?;
        let current = application.status()?;
        if current != ApplicationStatus::Submitted && !current.is_tracking() {
            return Err(AppError::InvalidTransition(format!(
                "application {application_id} is {current}; progress can only be reported after submission"
            )));
        }
        if current == status {
            return Ok(application);
        }

        let response_at = application.response_at.is_none().then(Utc::now);
        let updated = self
            .store
            .transition_application(
                application_id,
                current,
                status,
                ApplicationPatch {
                    notes,
                    response_at,
                    ..Default::default()
                },
            )
            .await?;

        if status.is_terminal() {
            let cancelled = self
                .store
                .cancel_followups(application_id, Utc::now())
                .await?;
            info!("Application {application_id} closed as {status}; {cancelled} follow-up(s) cancelled");
        }
        Ok(updated)
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub async fn list_applications(
        &self,
        user_id: Uuid,
        status: Option<ApplicationStatus>,
        limit: Option<i64>,
    ) -> Result<Vec<ApplicationRow>, AppError> {
        self.store
            .list_applications(user_id, status, clamp_list_limit(limit))
            .await
    }

    pub async fn get_application(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<ApplicationRow, AppError> {
        self.owned_application(user_id, application_id).await
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<ApplicationStats, AppError> {
        let user = self.load_user(user_id).await?;
        let daily_limit = self.daily_limit(&self.stored_criteria(&user));
        let submitted_today = self.limiter.used(user_id, utc_today()).await?;

        let mut by_status = BTreeMap::new();
        let mut total_applications = 0;
        let mut submitted = 0;
        let mut pending_approval = 0;
        for (status, count) in self.store.status_counts(user_id).await? {
            total_applications += count;
            match status.parse::<ApplicationStatus>() {
                Ok(ApplicationStatus::PendingApproval) => pending_approval += count,
                Ok(s) if s.is_submitted_or_later() && s != ApplicationStatus::Submitting => {
                    submitted += count
                }
                _ => {}
            }
            by_status.insert(status, count);
        }

        Ok(ApplicationStats {
            total_applications,
            by_status,
            submitted,
            pending_approval,
            submitted_today,
            daily_limit,
            remaining_today: daily_limit.saturating_sub(submitted_today),
        })
    }

    // ── Internals ───────────────────────────────────────────────────────────

    pub(crate) async fn load_user(&self, user_id: Uuid) -> Result<UserRow, AppError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
    }

    async fn load_resume(&self, user_id: Uuid) -> Result<ResumeRow, AppError> {
        self.store.current_resume(user_id).await?.ok_or_else(|| {
            AppError::Validation(
                "No base resume on file. Upload a resume before applying.".to_string(),
            )
        })
    }

    async fn load_opportunity(&self, id: Uuid) -> Result<OpportunityRow, AppError> {
        self.store
            .get_opportunity(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Opportunity {id} not found")))
    }

    async fn load_application(&self, id: Uuid) -> Result<ApplicationRow, AppError> {
        self.store
            .get_application(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))
    }

    /// Foreign applications are indistinguishable from missing ones.
    async fn owned_application(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<ApplicationRow, AppError> {
        match self.store.get_application(application_id).await? {
            Some(application) if application.user_id == user_id => Ok(application),
            _ => Err(AppError::NotFound(format!(
                "Application {application_id} not found"
            ))),
        }
    }

    pub(crate) fn stored_criteria(&self, user: &UserRow) -> SearchCriteria {
        match &user.search_criteria {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!("Stored search criteria for user {} unreadable: {e}", user.id);
                SearchCriteria::default()
            }),
            None => SearchCriteria::default(),
        }
    }

    /// The user's own limit, capped by the service-wide one.
    pub(crate) fn daily_limit(&self, criteria: &SearchCriteria) -> u32 {
        criteria
            .max_applications_per_day
            .min(self.config.max_applications_per_day)
    }

    async fn search_boards(&self, criteria: &SearchCriteria) -> Vec<JobListing> {
        let mut listings = Vec::new();
        for board in self.boards.iter().filter(|b| criteria.wants(b.source())) {
            match board.search(criteria).await {
                Ok(found) => {
                    info!("{} returned {} listing(s)", board.source(), found.len());
                    listings.extend(found);
                }
                Err(e) => warn!("Skipping {}: {e}", board.source()),
            }
        }
        listings
    }

    /// Parses and scores an opportunity once; later runs reuse the stored result.
    async fn score_opportunity(
        &self,
        resume: &ResumeRow,
        opportunity: OpportunityRow,
    ) -> Result<OpportunityRow, AppError> {
        let opportunity = if opportunity.fit_score.is_some() && opportunity.parsed_jd.is_some() {
            opportunity
        } else {
            let parsed = self.agent.parse_job(&opportunity).await?;
            let report = self.scorer.score(resume, &parsed).await?;
            info!(
                "Fit {}/100 ({}) for {} at {}",
                report.overall_score, report.scorer_backend, opportunity.title, opportunity.company
            );
            let parsed = serde_json::to_value(&parsed).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to serialize ParsedJD: {e}"))
            })?;
            self.store
                .record_fit(opportunity.id, report.fit_fraction(), parsed)
                .await?
        };

        if opportunity.status()? == OpportunityStatus::Identified {
            self.move_opportunity(&opportunity, OpportunityStatus::Reviewing)
                .await
        } else {
            Ok(opportunity)
        }
    }

    async fn prepare_materials(
        &self,
        resume: &ResumeRow,
        opportunity: &OpportunityRow,
        application: ApplicationRow,
    ) -> Result<ApplicationRow, AppError> {
        let parsed = match opportunity
            .parsed_jd
            .as_ref()
            .and_then(|v| serde_json::from_value::<ParsedJD>(v.clone()).ok())
        {
            Some(parsed) => parsed,
            None => self.agent.parse_job(opportunity).await?,
        };

        let tailored = self.agent.tailor_resume(resume, opportunity, &parsed).await?;
        let cover_letter = self
            .agent
            .write_cover_letter(resume, opportunity, &parsed)
            .await?;

        let packet = render_packet(opportunity, &tailored, &cover_letter);
        let packet_key = match self
            .archive
            .store(application.user_id, application.id, packet)
            .await
        {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Packet for application {} not archived: {e}", application.id);
                None
            }
        };

        let tailored = serde_json::to_value(&tailored).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to serialize tailored resume: {e}"))
        })?;
        let saved = self
            .store
            .save_materials(application.id, tailored, cover_letter, packet_key)
            .await?;
        info!("Materials ready for application {}", saved.id);
        Ok(saved)
    }

    async fn request_approval(
        &self,
        application: ApplicationRow,
        opportunity: &OpportunityRow,
    ) -> Result<ApplicationRow, AppError> {
        let deadline = Utc::now() + Duration::hours(self.config.approval_timeout_hours);
        let pending = match self
            .store
            .transition_application(
                application.id,
                ApplicationStatus::Draft,
                ApplicationStatus::PendingApproval,
                ApplicationPatch {
                    approval_deadline: Some(deadline),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(pending) => pending,
            // Another caller advanced the draft first; report where it is now.
            Err(AppError::InvalidTransition(_)) => {
                return self.load_application(application.id).await
            }
            Err(e) => return Err(e),
        };

        notify_quietly(
            self.notifier.as_ref(),
            pending.user_id,
            Notification::ApprovalRequested {
                application_id: pending.id,
                company: opportunity.company.clone(),
                title: opportunity.title.clone(),
                url: opportunity.url.clone(),
                deadline,
            },
        )
        .await;
        info!(
            "Application {} awaiting approval until {deadline}",
            pending.id
        );
        Ok(pending)
    }

    /// Submits, or leaves the application approved when today's quota is spent.
    async fn submit_or_queue(&self, application: ApplicationRow) -> Result<ApplicationRow, AppError> {
        let id = application.id;
        match self.submit(application).await {
            Err(AppError::RateLimited { limit }) => {
                warn!("Application {id} queued: daily limit of {limit} reached");
                self.load_application(id).await
            }
            other => other,
        }
    }

    pub(crate) async fn expire_approval(
        &self,
        application: ApplicationRow,
    ) -> Result<ApplicationRow, AppError> {
        let expired = self
            .store
            .transition_application(
                application.id,
                ApplicationStatus::PendingApproval,
                ApplicationStatus::Rejected,
                ApplicationPatch {
                    notes: Some("approval window elapsed".to_string()),
                    ..Default::default()
                },
            )
            .await?;
        self.reject_opportunity(expired.opportunity_id).await;
        info!("Approval for application {} expired", expired.id);
        Ok(expired)
    }

    async fn reject_opportunity(&self, opportunity_id: Uuid) {
        let result = match self.load_opportunity(opportunity_id).await {
            Ok(opportunity) => self
                .move_opportunity(&opportunity, OpportunityStatus::Rejected)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Opportunity {opportunity_id} not marked rejected: {e}");
        }
    }

    /// CAS from the row's current status; already being there is fine.
    async fn move_opportunity(
        &self,
        opportunity: &OpportunityRow,
        to: OpportunityStatus,
    ) -> Result<OpportunityRow, AppError> {
        let from = opportunity.status()?;
        if from == to {
            return Ok(opportunity.clone());
        }
        self.store
            .transition_opportunity(opportunity.id, from, to)
            .await
    }

    async fn release_permit(&self, user_id: Uuid, day: NaiveDate) {
        if let Err(e) = self.limiter.release(user_id, day).await {
            warn!("Failed to release submission permit for user {user_id}: {e}");
        }
    }

    async fn send_summary(&self, user_id: Uuid, summary: &DailySummary) {
        notify_quietly(
            self.notifier.as_ref(),
            user_id,
            Notification::DailySummary(summary.clone()),
        )
        .await;
    }
}
