use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::errors::AppError;
use crate::sources::{
    board_error, build_listing, first_str, JobBoard, JobListing, JobSource, SearchCriteria,
    SEARCH_PAGE_SIZE,
};

const INDEED_SEARCH_URL: &str = "https://api.indeed.com/ads/apisearch";

pub struct IndeedBoard {
    http: reqwest::Client,
    publisher_key: String,
}

impl IndeedBoard {
    pub fn new(http: reqwest::Client, publisher_key: String) -> Self {
        Self { http, publisher_key }
    }
}

#[async_trait]
impl JobBoard for IndeedBoard {
    fn source(&self) -> JobSource {
        JobSource::Indeed
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<JobListing>, AppError> {
        let location = if criteria.remote_only {
            "Remote"
        } else {
            criteria.location.as_str()
        };
        info!("Searching Indeed: q={:?} l={:?}", criteria.keywords, location);

        let limit = SEARCH_PAGE_SIZE.to_string();
        let body: Value = self
            .http
            .get(INDEED_SEARCH_URL)
            .query(&[
                ("publisher", self.publisher_key.as_str()),
                ("q", criteria.keywords.as_str()),
                ("l", location),
                ("limit", limit.as_str()),
                ("sort", "date"),
                ("format", "json"),
                ("v", "2"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| board_error(JobSource::Indeed, e))?
            .json()
            .await
            .map_err(|e| board_error(JobSource::Indeed, e))?;

        Ok(parse_results(&body))
    }
}

/// Parses the `results[]` array of an Indeed search response.
pub fn parse_results(body: &Value) -> Vec<JobListing> {
    body.get("results")
        .and_then(Value::as_array)
        .map(|jobs| {
            jobs.iter()
                .filter_map(|job| {
                    build_listing(
                        JobSource::Indeed,
                        first_str(job, &["/jobtitle"]),
                        first_str(job, &["/company"]),
                        first_str(job, &["/formattedLocation", "/city"]),
                        first_str(job, &["/url"]),
                        first_str(job, &["/snippet"]),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}
