//! Job boards: opportunity search behind the `JobBoard` trait.
//!
//! Each board is enabled only when its API key is configured. Response parsing is a
//! pure function per board so it can be exercised against JSON fixtures.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::BoardKeys;
use crate::errors::AppError;
use crate::models::opportunity::NewOpportunity;

pub mod glassdoor;
pub mod indeed;
pub mod linkedin;

/// Results requested from each board per search.
pub const SEARCH_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Indeed,
    Linkedin,
    Glassdoor,
    Manual,
}

impl JobSource {
    pub fn as_str(self) -> &'static str {
        match self {
            JobSource::Indeed => "indeed",
            JobSource::Linkedin => "linkedin",
            JobSource::Glassdoor => "glassdoor",
            JobSource::Manual => "manual",
        }
    }
}

impl fmt::Display for JobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to search for. Stored per user; any field missing from stored JSON takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCriteria {
    pub keywords: String,
    pub location: String,
    pub remote_only: bool,
    pub max_applications_per_day: u32,
    pub search_indeed: bool,
    pub search_linkedin: bool,
    pub search_glassdoor: bool,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            keywords: "software engineer".to_string(),
            location: "Remote".to_string(),
            remote_only: true,
            max_applications_per_day: 5,
            search_indeed: true,
            search_linkedin: true,
            search_glassdoor: false,
        }
    }
}

impl SearchCriteria {
    pub fn wants(&self, source: JobSource) -> bool {
        match source {
            JobSource::Indeed => self.search_indeed,
            JobSource::Linkedin => self.search_linkedin,
            JobSource::Glassdoor => self.search_glassdoor,
            JobSource::Manual => false,
        }
    }
}

/// A posting as returned by a board, before it is persisted as an opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    pub source: JobSource,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub url: String,
    pub description: String,
}

impl JobListing {
    pub fn into_new_opportunity(self, user_id: Uuid) -> NewOpportunity {
        NewOpportunity {
            user_id,
            source: self.source,
            title: self.title,
            company: self.company,
            location: self.location,
            url: self.url,
            description: self.description,
        }
    }
}

#[async_trait]
pub trait JobBoard: Send + Sync {
    fn source(&self) -> JobSource;

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<JobListing>, AppError>;
}

/// Builds every board whose API key is configured.
pub fn configured_boards(keys: &BoardKeys, http: reqwest::Client) -> Vec<Arc<dyn JobBoard>> {
    let mut boards: Vec<Arc<dyn JobBoard>> = Vec::new();
    if let Some(key) = &keys.indeed {
        boards.push(Arc::new(indeed::IndeedBoard::new(http.clone(), key.clone())));
    }
    if let Some(key) = &keys.linkedin {
        boards.push(Arc::new(linkedin::LinkedInBoard::new(http.clone(), key.clone())));
    }
    if let Some(key) = &keys.glassdoor {
        boards.push(Arc::new(glassdoor::GlassdoorBoard::new(http, key.clone())));
    }
    boards
}

/// Drops repeated postings, keeping the first occurrence of each `(url, title, company)`.
pub fn dedupe_listings(listings: Vec<JobListing>) -> Vec<JobListing> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|l| seen.insert((l.url.clone(), l.title.clone(), l.company.clone())))
        .collect()
}

/// First non-empty string found at any of the given JSON pointer paths.
pub(crate) fn first_str(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| value.pointer(p).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// Assembles a listing from raw fields; postings without a url or title are unusable.
pub(crate) fn build_listing(
    source: JobSource,
    title: Option<String>,
    company: Option<String>,
    location: Option<String>,
    url: Option<String>,
    description: Option<String>,
) -> Option<JobListing> {
    Some(JobListing {
        source,
        title: title?,
        url: url?,
        company: company.unwrap_or_else(|| "Unknown company".to_string()),
        location,
        description: description.unwrap_or_default(),
    })
}

pub(crate) fn board_error(source: JobSource, e: reqwest::Error) -> AppError {
    AppError::Board(format!("{source} search failed: {e}"))
}
