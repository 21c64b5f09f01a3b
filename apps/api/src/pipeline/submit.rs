//! Hand-off of a finished application packet.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::ApplicationRow;
use crate::models::opportunity::OpportunityRow;

/// Ceiling on any board search or webhook call. Must stay well inside the
/// scheduler's stale-claim window so a slow hand-off is never reaped mid-flight.
pub const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client shared by the job boards and the submission webhook.
pub fn outbound_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(OUTBOUND_TIMEOUT).build()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub method: String,
    pub confirmation_number: Option<String>,
}

#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(
        &self,
        application: &ApplicationRow,
        opportunity: &OpportunityRow,
    ) -> Result<SubmissionReceipt, AppError>;
}

/// Leaves the archived packet for the user to send themselves.
pub struct ManualSubmitter;

#[async_trait]
impl Submitter for ManualSubmitter {
    async fn submit(
        &self,
        application: &ApplicationRow,
        opportunity: &OpportunityRow,
    ) -> Result<SubmissionReceipt, AppError> {
        info!(
            "Application {} prepared for manual submission at {}",
            application.id, opportunity.url
        );
        Ok(SubmissionReceipt {
            method: "manual".to_string(),
            confirmation_number: None,
        })
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    application_id: Uuid,
    user_id: Uuid,
    source: &'a str,
    url: &'a str,
    title: &'a str,
    company: &'a str,
    tailored_resume: Option<&'a Value>,
    cover_letter: Option<&'a str>,
    packet_s3_key: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    confirmation_number: Option<String>,
}

/// POSTs the packet to an external submission service.
pub struct WebhookSubmitter {
    http: reqwest::Client,
    url: String,
}

impl WebhookSubmitter {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl Submitter for WebhookSubmitter {
    async fn submit(
        &self,
        application: &ApplicationRow,
        opportunity: &OpportunityRow,
    ) -> Result<SubmissionReceipt, AppError> {
        let payload = WebhookPayload {
            application_id: application.id,
            user_id: application.user_id,
            source: &opportunity.source,
            url: &opportunity.url,
            title: &opportunity.title,
            company: &opportunity.company,
            tailored_resume: application.tailored_resume.as_ref(),
            cover_letter: application.cover_letter.as_deref(),
            packet_s3_key: application.packet_s3_key.as_deref(),
        };

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Submission(format!("webhook hand-off failed: {e}")))?;

        // An empty or non-JSON body still counts as accepted.
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Submission(format!("webhook reply unreadable: {e}")))?;
        let reply: WebhookReply = serde_json::from_str(&body).unwrap_or_default();

        Ok(SubmissionReceipt {
            method: "webhook".to_string(),
            confirmation_number: reply.confirmation_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::scheduler::STALE_CLAIM_MINUTES;
    use chrono::Utc;

    #[test]
    fn test_outbound_calls_finish_before_a_claim_goes_stale() {
        assert!(outbound_client().is_ok());
        let stale_after = Duration::from_secs(STALE_CLAIM_MINUTES as u64 * 60);
        assert!(OUTBOUND_TIMEOUT * 10 <= stale_after);
    }

    #[tokio::test]
    async fn test_manual_submitter_has_no_confirmation() {
        let now = Utc::now();
        let application = ApplicationRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            opportunity_id: Uuid::new_v4(),
            status: "submitting".to_string(),
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
        let opportunity = OpportunityRow {
            id: application.opportunity_id,
            user_id: application.user_id,
            source: "manual".to_string(),
            title: "Engineer".to_string(),
            company: "Acme".to_string(),
            location: None,
            url: "https://acme.example/jobs/1".to_string(),
            description: String::new(),
            fit_score: None,
            parsed_jd: None,
            status: "applying".to_string(),
            discovered_at: now,
            updated_at: now,
        };

        let receipt = ManualSubmitter.submit(&application, &opportunity).await.unwrap();
        assert_eq!(receipt.method, "manual");
        assert!(receipt.confirmation_number.is_none());
    }

    #[test]
    fn test_webhook_reply_tolerates_missing_confirmation() {
        let reply: WebhookReply = serde_json::from_str("{}").unwrap();
        assert!(reply.confirmation_number.is_none());
    }
}
