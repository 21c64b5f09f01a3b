use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::errors::AppError;
use crate::sources::{
    board_error, build_listing, first_str, JobBoard, JobListing, JobSource, SearchCriteria,
    SEARCH_PAGE_SIZE,
};

const GLASSDOOR_API_URL: &str = "https://api.glassdoor.com/api/api.htm";

pub struct GlassdoorBoard {
    http: reqwest::Client,
    partner_key: String,
}

impl GlassdoorBoard {
    pub fn new(http: reqwest::Client, partner_key: String) -> Self {
        Self { http, partner_key }
    }
}

#[async_trait]
impl JobBoard for GlassdoorBoard {
    fn source(&self) -> JobSource {
        JobSource::Glassdoor
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<JobListing>, AppError> {
        info!(
            "Searching Glassdoor: q={:?} l={:?}",
            criteria.keywords, criteria.location
        );

        let page_size = SEARCH_PAGE_SIZE.to_string();
        let body: Value = self
            .http
            .get(GLASSDOOR_API_URL)
            .query(&[
                ("action", "jobs-search"),
                ("format", "json"),
                ("v", "1"),
                ("t.k", self.partner_key.as_str()),
                ("q", criteria.keywords.as_str()),
                ("l", criteria.location.as_str()),
                ("pagesize", page_size.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| board_error(JobSource::Glassdoor, e))?
            .json()
            .await
            .map_err(|e| board_error(JobSource::Glassdoor, e))?;

        Ok(parse_job_listings(&body))
    }
}

/// Parses `response.jobListings[]` of a Glassdoor jobs-search response.
pub fn parse_job_listings(body: &Value) -> Vec<JobListing> {
    body.pointer("/response/jobListings")
        .and_then(Value::as_array)
        .map(|jobs| {
            jobs.iter()
                .filter_map(|job| {
                    build_listing(
                        JobSource::Glassdoor,
                        first_str(job, &["/jobTitle"]),
                        first_str(job, &["/employer/name", "/employerName"]),
                        first_str(job, &["/location"]),
                        first_str(job, &["/jobViewUrl"]),
                        first_str(job, &["/descriptionFragment"]),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}
