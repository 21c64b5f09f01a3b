//! In-memory fakes for every pipeline seam. The store mirrors the Postgres
//! semantics: idempotent inserts on natural keys and compare-and-set transitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::errors::AppError;
use crate::matching::fit_scoring::KeywordFitScorer;
use crate::matching::jd_parser::{KeywordEntry, ParsedJD};
use crate::materials::packet::{packet_key, PacketArchive};
use crate::materials::tailor::TailoredResume;
use crate::materials::JobAgent;
use crate::models::application::{ApplicationPatch, ApplicationRow, FollowupRow};
use crate::models::opportunity::{NewOpportunity, OpportunityRow};
use crate::models::resume::ResumeRow;
use crate::models::user::UserRow;
use crate::pipeline::notify::{Notification, Notifier};
use crate::pipeline::orchestrator::JobApplicationPipeline;
use crate::pipeline::rate_limit::RateLimiter;
use crate::pipeline::status::{ApplicationStatus, OpportunityStatus};
use crate::pipeline::store::{guard_application, guard_opportunity, lost_race, PipelineStore};
use crate::pipeline::submit::{SubmissionReceipt, Submitter};
use crate::sources::{JobBoard, JobListing, JobSource, SearchCriteria};

// ────────────────────────────────────────────────────────────────────────────
// Store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, UserRow>,
    resumes: Vec<ResumeRow>,
    opportunities: Vec<OpportunityRow>,
    applications: Vec<ApplicationRow>,
    followups: Vec<FollowupRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    fn with<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add_user(&self, user: UserRow) {
        self.with(|s| s.users.insert(user.id, user));
    }

    pub fn add_resume(&self, resume: ResumeRow) {
        self.with(|s| s.resumes.push(resume));
    }

    pub fn opportunities(&self) -> Vec<OpportunityRow> {
        self.with(|s| s.opportunities.clone())
    }

    pub fn applications(&self) -> Vec<ApplicationRow> {
        self.with(|s| s.applications.clone())
    }

    pub fn followups(&self) -> Vec<FollowupRow> {
        self.with(|s| s.followups.clone())
    }

    /// Rewrites an application row directly, bypassing the transition table.
    pub fn force_application(&self, id: Uuid, f: impl FnOnce(&mut ApplicationRow)) {
        self.with(|s| {
            if let Some(app) = s.applications.iter_mut().find(|a| a.id == id) {
                f(app);
            }
        });
    }

    pub fn force_followup(&self, id: Uuid, f: impl FnOnce(&mut FollowupRow)) {
        self.with(|s| {
            if let Some(followup) = s.followups.iter_mut().find(|f| f.id == id) {
                f(followup);
            }
        });
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRow>, AppError> {
        Ok(self.with(|s| s.users.get(&user_id).cloned()))
    }

    async fn auto_apply_users(&self) -> Result<Vec<UserRow>, AppError> {
        Ok(self.with(|s| {
            s.users
                .values()
                .filter(|u| u.auto_apply_enabled)
                .cloned()
                .collect()
        }))
    }

    async fn claim_daily_run(&self, user_id: Uuid, day: NaiveDate) -> Result<bool, AppError> {
        Ok(self.with(|s| match s.users.get_mut(&user_id) {
            Some(user) if user.last_search_on.map(|d| d < day).unwrap_or(true) => {
                user.last_search_on = Some(day);
                true
            }
            _ => false,
        }))
    }

    async fn current_resume(&self, user_id: Uuid) -> Result<Option<ResumeRow>, AppError> {
        Ok(self.with(|s| {
            s.resumes
                .iter()
                .find(|r| r.user_id == user_id && r.is_current)
                .cloned()
        }))
    }

    async fn upsert_opportunity(
        &self,
        new: NewOpportunity,
    ) -> Result<(OpportunityRow, bool), AppError> {
        Ok(self.with(|s| {
            if let Some(existing) = s.opportunities.iter().find(|o| {
                o.user_id == new.user_id
                    && o.url == new.url
                    && o.title == new.title
                    && o.company == new.company
            }) {
                return (existing.clone(), false);
            }
            let now = Utc::now();
            let row = OpportunityRow {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                source: new.source.as_str().to_string(),
                title: new.title,
                company: new.company,
                location: new.location,
                url: new.url,
                description: new.description,
                fit_score: None,
                parsed_jd: None,
                status: OpportunityStatus::Identified.as_str().to_string(),
                discovered_at: now,
                updated_at: now,
            };
            s.opportunities.push(row.clone());
            (row, true)
        }))
    }

    async fn get_opportunity(&self, id: Uuid) -> Result<Option<OpportunityRow>, AppError> {
        Ok(self.with(|s| s.opportunities.iter().find(|o| o.id == id).cloned()))
    }

    async fn record_fit(
        &self,
        id: Uuid,
        fit_score: f64,
        parsed_jd: Value,
    ) -> Result<OpportunityRow, AppError> {
        self.with(|s| {
            let row = s
                .opportunities
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or_else(|| AppError::NotFound(format!("Opportunity {id} not found")))?;
            row.fit_score = Some(fit_score.clamp(0.0, 1.0));
            row.parsed_jd = Some(parsed_jd);
            row.updated_at = Utc::now();
            Ok(row.clone())
        })
    }

    async fn transition_opportunity(
        &self,
        id: Uuid,
        from: OpportunityStatus,
        to: OpportunityStatus,
    ) -> Result<OpportunityRow, AppError> {
        guard_opportunity(id, from, to)?;
        self.with(|s| {
            match s
                .opportunities
                .iter_mut()
                .find(|o| o.id == id && o.status == from.as_str())
            {
                Some(row) => {
                    row.status = to.as_str().to_string();
                    row.updated_at = Utc::now();
                    Ok(row.clone())
                }
                None => Err(lost_race("opportunity", id, from.as_str(), to.as_str())),
            }
        })
    }

    async fn insert_draft(
        &self,
        user_id: Uuid,
        opportunity_id: Uuid,
    ) -> Result<ApplicationRow, AppError> {
        Ok(self.with(|s| {
            if let Some(existing) = s
                .applications
                .iter()
                .find(|a| a.opportunity_id == opportunity_id)
            {
                return existing.clone();
            }
            let now = Utc::now();
            let row = ApplicationRow {
                id: Uuid::new_v4(),
                user_id,
                opportunity_id,
                status: ApplicationStatus::Draft.as_str().to_string(),
                tailored_resume: None,
                cover_letter: None,
                packet_s3_key: None,
                confirmation_number: None,
                submission_method: None,
                approval_deadline: None,
                submitted_at: None,
                response_at: None,
                notes: None,
                created_at: now,
                updated_at: now,
            };
            s.applications.push(row.clone());
            row
        }))
    }

    async fn application_for_opportunity(
        &self,
        opportunity_id: Uuid,
    ) -> Result<Option<ApplicationRow>, AppError> {
        Ok(self.with(|s| {
            s.applications
                .iter()
                .find(|a| a.opportunity_id == opportunity_id)
                .cloned()
        }))
    }

    async fn get_application(&self, id: Uuid) -> Result<Option<ApplicationRow>, AppError> {
        Ok(self.with(|s| s.applications.iter().find(|a| a.id == id).cloned()))
    }

    async fn save_materials(
        &self,
        id: Uuid,
        tailored_resume: Value,
        cover_letter: String,
        packet_s3_key: Option<String>,
    ) -> Result<ApplicationRow, AppError> {
        self.with(|s| {
            match s
                .applications
                .iter_mut()
                .find(|a| a.id == id && a.status == ApplicationStatus::Draft.as_str())
            {
                Some(row) => {
                    row.tailored_resume = Some(tailored_resume);
                    row.cover_letter = Some(cover_letter);
                    if packet_s3_key.is_some() {
                        row.packet_s3_key = packet_s3_key;
                    }
                    row.updated_at = Utc::now();
                    Ok(row.clone())
                }
                None => Err(lost_race("application", id, "draft", "draft")),
            }
        })
    }

    async fn transition_application(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
        patch: ApplicationPatch,
    ) -> Result<ApplicationRow, AppError> {
        guard_application(id, from, to)?;
        self.with(|s| {
            match s
                .applications
                .iter_mut()
                .find(|a| a.id == id && a.status == from.as_str())
            {
                Some(row) => {
                    row.status = to.as_str().to_string();
                    if patch.notes.is_some() {
                        row.notes = patch.notes;
                    }
                    if patch.approval_deadline.is_some() {
                        row.approval_deadline = patch.approval_deadline;
                    }
                    if patch.submitted_at.is_some() {
                        row.submitted_at = patch.submitted_at;
                    }
                    if patch.confirmation_number.is_some() {
                        row.confirmation_number = patch.confirmation_number;
                    }
                    if patch.submission_method.is_some() {
                        row.submission_method = patch.submission_method;
                    }
                    if patch.response_at.is_some() {
                        row.response_at = patch.response_at;
                    }
                    row.updated_at = Utc::now();
                    Ok(row.clone())
                }
                None => Err(lost_race("application", id, from.as_str(), to.as_str())),
            }
        })
    }

    async fn list_applications(
        &self,
        user_id: Uuid,
        status: Option<ApplicationStatus>,
        limit: i64,
    ) -> Result<Vec<ApplicationRow>, AppError> {
        Ok(self.with(|s| {
            let mut rows: Vec<ApplicationRow> = s
                .applications
                .iter()
                .filter(|a| a.user_id == user_id)
                .filter(|a| status.map(|st| a.status == st.as_str()).unwrap_or(true))
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            rows.truncate(limit.max(0) as usize);
            rows
        }))
    }

    async fn status_counts(&self, user_id: Uuid) -> Result<Vec<(String, i64)>, AppError> {
        Ok(self.with(|s| {
            let mut counts: HashMap<String, i64> = HashMap::new();
            for app in s.applications.iter().filter(|a| a.user_id == user_id) {
                *counts.entry(app.status.clone()).or_default() += 1;
            }
            counts.into_iter().collect()
        }))
    }

    async fn expired_approvals(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ApplicationRow>, AppError> {
        Ok(self.with(|s| {
            s.applications
                .iter()
                .filter(|a| a.status == ApplicationStatus::PendingApproval.as_str())
                .filter(|a| a.approval_deadline.map(|d| d < now).unwrap_or(false))
                .take(limit.max(0) as usize)
                .cloned()
                .collect()
        }))
    }

    async fn stale_submissions(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ApplicationRow>, AppError> {
        Ok(self.with(|s| {
            s.applications
                .iter()
                .filter(|a| a.status == ApplicationStatus::Submitting.as_str())
                .filter(|a| a.updated_at < cutoff)
                .take(limit.max(0) as usize)
                .cloned()
                .collect()
        }))
    }

    async fn approved_applications(&self, limit: i64) -> Result<Vec<ApplicationRow>, AppError> {
        Ok(self.with(|s| {
            s.applications
                .iter()
                .filter(|a| a.status == ApplicationStatus::Approved.as_str())
                .take(limit.max(0) as usize)
                .cloned()
                .collect()
        }))
    }

    async fn schedule_followup(
        &self,
        application: &ApplicationRow,
        offset_days: u32,
        due_at: DateTime<Utc>,
        message: String,
    ) -> Result<bool, AppError> {
        Ok(self.with(|s| {
            let offset = offset_days as i32;
            if s
                .followups
                .iter()
                .any(|f| f.application_id == application.id && f.offset_days == offset)
            {
                return false;
            }
            s.followups.push(FollowupRow {
                id: Uuid::new_v4(),
                application_id: application.id,
                user_id: application.user_id,
                offset_days: offset,
                due_at,
                message,
                sent_at: None,
                cancelled_at: None,
                created_at: Utc::now(),
            });
            true
        }))
    }

    async fn followups_for(&self, application_id: Uuid) -> Result<Vec<FollowupRow>, AppError> {
        Ok(self.with(|s| {
            let mut rows: Vec<FollowupRow> = s
                .followups
                .iter()
                .filter(|f| f.application_id == application_id)
                .cloned()
                .collect();
            rows.sort_by_key(|f| f.offset_days);
            rows
        }))
    }

    async fn due_followups(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FollowupRow>, AppError> {
        Ok(self.with(|s| {
            s.followups
                .iter()
                .filter(|f| f.sent_at.is_none() && f.cancelled_at.is_none() && f.due_at <= now)
                .take(limit.max(0) as usize)
                .cloned()
                .collect()
        }))
    }

    async fn mark_followup_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        Ok(self.with(|s| {
            match s
                .followups
                .iter_mut()
                .find(|f| f.id == id && f.sent_at.is_none() && f.cancelled_at.is_none())
            {
                Some(row) => {
                    row.sent_at = Some(now);
                    true
                }
                None => false,
            }
        }))
    }

    async fn cancel_followups(
        &self,
        application_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        Ok(self.with(|s| {
            let mut cancelled = 0;
            for row in s.followups.iter_mut().filter(|f| {
                f.application_id == application_id && f.sent_at.is_none() && f.cancelled_at.is_none()
            }) {
                row.cancelled_at = Some(now);
                cancelled += 1;
            }
            cancelled
        }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Collaborators
// ────────────────────────────────────────────────────────────────────────────

pub struct FakeBoard {
    pub source: JobSource,
    pub listings: Vec<JobListing>,
    pub fail: bool,
    pub searches: AtomicUsize,
}

impl FakeBoard {
    pub fn new(source: JobSource, listings: Vec<JobListing>) -> Self {
        Self {
            source,
            listings,
            fail: false,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn failing(source: JobSource) -> Self {
        Self {
            fail: true,
            ..Self::new(source, Vec::new())
        }
    }
}

#[async_trait]
impl JobBoard for FakeBoard {
    fn source(&self) -> JobSource {
        self.source
    }

    async fn search(&self, _criteria: &SearchCriteria) -> Result<Vec<JobListing>, AppError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Board(format!("{} is down", self.source)));
        }
        Ok(self.listings.clone())
    }
}

pub fn listing(source: JobSource, title: &str, company: &str, description: &str) -> JobListing {
    JobListing {
        source,
        title: title.to_string(),
        company: company.to_string(),
        location: Some("Remote".to_string()),
        url: format!(
            "https://jobs.example/{}/{}",
            company.to_lowercase(),
            title.to_lowercase().replace(' ', "-")
        ),
        description: description.to_string(),
    }
}

/// Every word of the description becomes an equally weighted keyword, so the
/// keyword scorer's result is predictable from the listing text.
#[derive(Default)]
pub struct FakeAgent {
    pub parses: AtomicUsize,
    pub letters: AtomicUsize,
    pub fail_letters: AtomicBool,
}

#[async_trait]
impl JobAgent for FakeAgent {
    async fn parse_job(&self, opportunity: &OpportunityRow) -> Result<ParsedJD, AppError> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        let keyword_inventory = opportunity
            .description
            .split_whitespace()
            .map(|word| KeywordEntry {
                keyword: word.to_lowercase(),
                frequency: 1,
                position_weight: 1.0,
                weighted_score: 1.0,
            })
            .collect();
        Ok(ParsedJD {
            keyword_inventory,
            ..Default::default()
        })
    }

    async fn tailor_resume(
        &self,
        resume: &ResumeRow,
        opportunity: &OpportunityRow,
        _parsed_jd: &ParsedJD,
    ) -> Result<TailoredResume, AppError> {
        Ok(TailoredResume {
            summary: format!("Tailored for {}", opportunity.company),
            skills_to_emphasize: resume.skills.clone(),
            highlights: vec!["Shipped a payments ledger".to_string()],
            keywords_added: vec![],
        })
    }

    async fn write_cover_letter(
        &self,
        _resume: &ResumeRow,
        opportunity: &OpportunityRow,
        _parsed_jd: &ParsedJD,
    ) -> Result<String, AppError> {
        self.letters.fetch_add(1, Ordering::SeqCst);
        if self.fail_letters.load(Ordering::SeqCst) {
            return Err(AppError::Llm("cover letter generation failed".to_string()));
        }
        Ok(format!("Dear {} team,\n\nI would like to apply.", opportunity.company))
    }
}

#[derive(Default)]
pub struct FakeSubmitter {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl Submitter for FakeSubmitter {
    async fn submit(
        &self,
        application: &ApplicationRow,
        _opportunity: &OpportunityRow,
    ) -> Result<SubmissionReceipt, AppError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Submission(format!(
                "portal rejected application {}",
                application.id
            )));
        }
        Ok(SubmissionReceipt {
            method: "fake".to_string(),
            confirmation_number: Some(format!("CONF-{n}")),
        })
    }
}

#[derive(Default)]
pub struct MemoryLimiter {
    counters: Mutex<HashMap<(Uuid, NaiveDate), u32>>,
}

#[async_trait]
impl RateLimiter for MemoryLimiter {
    async fn try_acquire(
        &self,
        user_id: Uuid,
        day: NaiveDate,
        limit: u32,
    ) -> Result<bool, AppError> {
        let mut counters = self.counters.lock().unwrap();
        let used = counters.entry((user_id, day)).or_default();
        if *used >= limit {
            return Ok(false);
        }
        *used += 1;
        Ok(true)
    }

    async fn release(&self, user_id: Uuid, day: NaiveDate) -> Result<(), AppError> {
        let mut counters = self.counters.lock().unwrap();
        if let Some(used) = counters.get_mut(&(user_id, day)) {
            *used = used.saturating_sub(1);
        }
        Ok(())
    }

    async fn used(&self, user_id: Uuid, day: NaiveDate) -> Result<u32, AppError> {
        Ok(self
            .counters
            .lock()
            .unwrap()
            .get(&(user_id, day))
            .copied()
            .unwrap_or(0))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Uuid, Notification)>>,
}

impl RecordingNotifier {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(|(_, n)| n.kind()).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: Uuid, notification: Notification) -> Result<(), AppError> {
        self.sent.lock().unwrap().push((user_id, notification));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryArchive {
    pub packets: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl PacketArchive for MemoryArchive {
    async fn store(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        markdown: String,
    ) -> Result<String, AppError> {
        let key = packet_key(user_id, application_id);
        self.packets.lock().unwrap().insert(key.clone(), markdown);
        Ok(key)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Harness
// ────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub agent: Arc<FakeAgent>,
    pub submitter: Arc<FakeSubmitter>,
    pub limiter: Arc<MemoryLimiter>,
    pub notifier: Arc<RecordingNotifier>,
    pub archive: Arc<MemoryArchive>,
    pub pipeline: Arc<JobApplicationPipeline>,
}

impl Harness {
    pub fn new(config: PipelineConfig, boards: Vec<Arc<dyn JobBoard>>) -> Self {
        let store = Arc::new(MemoryStore::default());
        let agent = Arc::new(FakeAgent::default());
        let submitter = Arc::new(FakeSubmitter::default());
        let limiter = Arc::new(MemoryLimiter::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let archive = Arc::new(MemoryArchive::default());

        let pipeline = Arc::new(JobApplicationPipeline {
            store: store.clone(),
            boards,
            agent: agent.clone(),
            scorer: Arc::new(KeywordFitScorer),
            submitter: submitter.clone(),
            limiter: limiter.clone(),
            notifier: notifier.clone(),
            archive: archive.clone(),
            config,
        });

        Self {
            store,
            agent,
            submitter,
            limiter,
            notifier,
            archive,
            pipeline,
        }
    }

    /// Adds a user whose current resume lists `rust` and `postgres`.
    pub fn seed_user(&self, auto_apply: bool, criteria: Option<SearchCriteria>) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store.add_user(UserRow {
            id: user_id,
            email: format!("{user_id}@example.com"),
            name: "Test User".to_string(),
            auto_apply_enabled: auto_apply,
            search_criteria: criteria.map(|c| serde_json::to_value(c).unwrap()),
            last_search_on: None,
            created_at: Utc::now(),
        });
        self.store.add_resume(ResumeRow {
            id: Uuid::new_v4(),
            user_id,
            title: "Base resume".to_string(),
            summary: Some("Backend engineer.".to_string()),
            skills: vec!["rust".to_string(), "postgres".to_string()],
            content: json!({}),
            raw_text: None,
            is_current: true,
            created_at: Utc::now(),
        });
        user_id
    }

    pub fn seed_user_without_resume(&self) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store.add_user(UserRow {
            id: user_id,
            email: format!("{user_id}@example.com"),
            name: "No Resume".to_string(),
            auto_apply_enabled: false,
            search_criteria: None,
            last_search_on: None,
            created_at: Utc::now(),
        });
        user_id
    }
}

pub fn approval_config() -> PipelineConfig {
    PipelineConfig::default()
}

pub fn auto_apply_config() -> PipelineConfig {
    PipelineConfig {
        require_approval: false,
        enable_auto_apply: true,
        ..PipelineConfig::default()
    }
}
