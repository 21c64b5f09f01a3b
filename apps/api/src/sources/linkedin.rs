use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::errors::AppError;
use crate::sources::{
    board_error, build_listing, first_str, JobBoard, JobListing, JobSource, SearchCriteria,
    SEARCH_PAGE_SIZE,
};

const LINKEDIN_SEARCH_URL: &str = "https://api.linkedin.com/v2/jobSearch";

pub struct LinkedInBoard {
    http: reqwest::Client,
    access_token: String,
}

impl LinkedInBoard {
    pub fn new(http: reqwest::Client, access_token: String) -> Self {
        Self { http, access_token }
    }
}

#[async_trait]
impl JobBoard for LinkedInBoard {
    fn source(&self) -> JobSource {
        JobSource::Linkedin
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<JobListing>, AppError> {
        info!(
            "Searching LinkedIn: keywords={:?} location={:?}",
            criteria.keywords, criteria.location
        );

        let count = SEARCH_PAGE_SIZE.to_string();
        let body: Value = self
            .http
            .get(LINKEDIN_SEARCH_URL)
            .bearer_auth(&self.access_token)
            .query(&[
                ("keywords", criteria.keywords.as_str()),
                ("location", criteria.location.as_str()),
                ("count", count.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| board_error(JobSource::Linkedin, e))?
            .json()
            .await
            .map_err(|e| board_error(JobSource::Linkedin, e))?;

        Ok(parse_elements(&body))
    }
}

/// Parses the `elements[]` array of a LinkedIn job search response.
pub fn parse_elements(body: &Value) -> Vec<JobListing> {
    body.get("elements")
        .and_then(Value::as_array)
        .map(|jobs| {
            jobs.iter()
                .filter_map(|job| {
                    build_listing(
                        JobSource::Linkedin,
                        first_str(job, &["/title"]),
                        first_str(job, &["/companyName", "/company/name"]),
                        first_str(job, &["/formattedLocation", "/location"]),
                        first_str(job, &["/applyUrl", "/url"]),
                        first_str(job, &["/description/text", "/description"]),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}
