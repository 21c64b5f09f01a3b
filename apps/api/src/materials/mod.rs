//! Application materials: everything the LLM writes on the candidate's behalf.
//!
//! `JobAgent` is the seam the pipeline calls; `LlmJobAgent` is the only production
//! implementation and routes every call through `LlmClient`.

use async_trait::async_trait;
use tracing::info;

use crate::errors::AppError;
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::LlmClient;
use crate::matching::jd_parser::{parse_jd, ParsedJD};
use crate::matching::tone::tone_guide;
use crate::models::opportunity::OpportunityRow;
use crate::models::resume::ResumeRow;

pub mod packet;
pub mod prompts;
pub mod tailor;

use prompts::{
    COVER_LETTER_PROMPT_TEMPLATE, COVER_LETTER_SYSTEM, TAILOR_PROMPT_TEMPLATE, TAILOR_SYSTEM,
};
use tailor::TailoredResume;

const PROMPT_KEYWORDS: usize = 15;

#[async_trait]
pub trait JobAgent: Send + Sync {
    async fn parse_job(&self, opportunity: &OpportunityRow) -> Result<ParsedJD, AppError>;

    async fn tailor_resume(
        &self,
        resume: &ResumeRow,
        opportunity: &OpportunityRow,
        parsed_jd: &ParsedJD,
    ) -> Result<TailoredResume, AppError>;

    async fn write_cover_letter(
        &self,
        resume: &ResumeRow,
        opportunity: &OpportunityRow,
        parsed_jd: &ParsedJD,
    ) -> Result<String, AppError>;
}

pub struct LlmJobAgent {
    llm: LlmClient,
}

impl LlmJobAgent {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl JobAgent for LlmJobAgent {
    async fn parse_job(&self, opportunity: &OpportunityRow) -> Result<ParsedJD, AppError> {
        parse_jd(
            &opportunity.title,
            &opportunity.company,
            &opportunity.description,
            &self.llm,
        )
        .await
    }

    async fn tailor_resume(
        &self,
        resume: &ResumeRow,
        opportunity: &OpportunityRow,
        parsed_jd: &ParsedJD,
    ) -> Result<TailoredResume, AppError> {
        let prompt = build_tailor_prompt(resume, opportunity, parsed_jd);
        let tailored: TailoredResume = self
            .llm
            .call_json(&prompt, TAILOR_SYSTEM)
            .await
            .map_err(|e| AppError::Llm(format!("Resume tailoring failed: {e}")))?;

        info!(
            "Tailored resume for opportunity {} ({} skills emphasised)",
            opportunity.id,
            tailored.skills_to_emphasize.len()
        );
        Ok(tailored.grounded_in(resume))
    }

    async fn write_cover_letter(
        &self,
        resume: &ResumeRow,
        opportunity: &OpportunityRow,
        parsed_jd: &ParsedJD,
    ) -> Result<String, AppError> {
        let prompt = build_cover_letter_prompt(resume, opportunity, parsed_jd);
        let letter = self
            .llm
            .call_text(&prompt, COVER_LETTER_SYSTEM)
            .await
            .map_err(|e| AppError::Llm(format!("Cover letter generation failed: {e}")))?;

        info!(
            "Cover letter for opportunity {}: {} words",
            opportunity.id,
            letter.split_whitespace().count()
        );
        Ok(letter)
    }
}

fn build_tailor_prompt(resume: &ResumeRow, opportunity: &OpportunityRow, jd: &ParsedJD) -> String {
    TAILOR_PROMPT_TEMPLATE
        .replace("{title}", &opportunity.title)
        .replace("{company}", &opportunity.company)
        .replace("{jd_summary}", &jd.summary())
        .replace("{keywords}", &jd.top_keywords(PROMPT_KEYWORDS).join(", "))
        .replace("{resume_text}", &resume.to_text())
        .replace("{grounding}", GROUNDING_INSTRUCTION)
}

fn build_cover_letter_prompt(
    resume: &ResumeRow,
    opportunity: &OpportunityRow,
    jd: &ParsedJD,
) -> String {
    let guide = tone_guide(&jd.detected_tone);
    COVER_LETTER_PROMPT_TEMPLATE
        .replace("{title}", &opportunity.title)
        .replace("{company}", &opportunity.company)
        .replace("{jd_summary}", &jd.summary())
        .replace("{register}", guide.register)
        .replace("{strong_verbs}", &guide.strong_verbs.join(", "))
        .replace("{avoid_phrases}", &guide.avoid_phrases.join("; "))
        .replace("{resume_text}", &resume.to_text())
        .replace("{grounding}", GROUNDING_INSTRUCTION)
}
