//! Application packet: markdown bundle of the tailored resume and cover letter,
//! archived to S3 so the user can review exactly what was (or will be) sent.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::materials::tailor::TailoredResume;
use crate::models::opportunity::OpportunityRow;

pub fn packet_key(user_id: Uuid, application_id: Uuid) -> String {
    format!("applications/{user_id}/{application_id}.md")
}

/// Renders the packet as markdown.
pub fn render_packet(
    opportunity: &OpportunityRow,
    tailored: &TailoredResume,
    cover_letter: &str,
) -> String {
    let mut md = String::new();

    md.push_str(&format!(
        "# {} at {}\n\n",
        opportunity.title, opportunity.company
    ));
    md.push_str(&format!("- Source: {}\n", opportunity.source));
    md.push_str(&format!("- URL: {}\n", opportunity.url));
    if let Some(location) = &opportunity.location {
        md.push_str(&format!("- Location: {location}\n"));
    }
    if let Some(score) = opportunity.fit_score {
        md.push_str(&format!("- Fit score: {:.0}%\n", score * 100.0));
    }

    md.push_str("\n## Tailored resume\n\n");
    if !tailored.summary.is_empty() {
        md.push_str(&tailored.summary);
        md.push_str("\n\n");
    }
    if !tailored.skills_to_emphasize.is_empty() {
        md.push_str(&format!(
            "**Skills:** {}\n\n",
            tailored.skills_to_emphasize.join(", ")
        ));
    }
    for highlight in &tailored.highlights {
        md.push_str(&format!("- {highlight}\n"));
    }

    md.push_str("\n## Cover letter\n\n");
    md.push_str(cover_letter.trim());
    md.push('\n');

    md
}

#[async_trait]
pub trait PacketArchive: Send + Sync {
    /// Stores the packet and returns its object key.
    async fn store(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        markdown: String,
    ) -> Result<String, AppError>;
}

pub struct S3PacketArchive {
    client: S3Client,
    bucket: String,
}

impl S3PacketArchive {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl PacketArchive for S3PacketArchive {
    async fn store(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        markdown: String,
    ) -> Result<String, AppError> {
        let key = packet_key(user_id, application_id);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(markdown.into_bytes()))
            .content_type("text/markdown")
            .send()
            .await
            .map_err(|e| AppError::S3(format!("Packet upload failed: {e}")))?;

        info!("Archived application packet to s3://{}/{}", self.bucket, key);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_packet_key_layout() {
        let user = Uuid::nil();
        let app = Uuid::nil();
        assert_eq!(
            packet_key(user, app),
            format!("applications/{user}/{app}.md")
        );
    }

    #[test]
    fn test_render_packet_sections() {
        let opportunity = OpportunityRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            source: "indeed".to_string(),
            title: "Backend Engineer".to_string(),
            company: "Acme".to_string(),
            location: Some("Remote".to_string()),
            url: "https://acme.example/jobs/7".to_string(),
            description: String::new(),
            fit_score: Some(0.82),
            parsed_jd: None,
            status: "applying".to_string(),
            discovered_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let tailored = TailoredResume {
            summary: "Backend engineer focused on payments.".to_string(),
            skills_to_emphasize: vec!["rust".to_string(), "postgres".to_string()],
            highlights: vec!["Cut settlement latency 40%".to_string()],
            keywords_added: vec![],
        };

        let md = render_packet(&opportunity, &tailored, "Dear Acme team,\n\nHello.\n");
        assert!(md.starts_with("# Backend Engineer at Acme"));
        assert!(md.contains("- Fit score: 82%"));
        assert!(md.contains("**Skills:** rust, postgres"));
        assert!(md.contains("- Cut settlement latency 40%"));
        assert!(md.trim_end().ends_with("Hello."));
    }
}
