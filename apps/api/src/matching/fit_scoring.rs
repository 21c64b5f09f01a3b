//! Fit Scoring: pluggable, trait-based scorer that measures a base resume against a parsed JD.
//!
//! Default: `KeywordFitScorer` (pure Rust, deterministic, no LLM call).
//! `LlmFitScorer` asks Claude for a semantic verdict; enabled via `ENABLE_LLM_FIT_SCORING`.
//!
//! `AppState` holds an `Arc<dyn FitScorer>`, chosen at startup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::llm_client::LlmClient;
use crate::matching::jd_parser::ParsedJD;
use crate::matching::prompts::{FIT_SCORE_PROMPT_TEMPLATE, FIT_SCORE_SYSTEM};
use crate::models::resume::ResumeRow;

const STRONG_THRESHOLD: f32 = 0.8;
const PARTIAL_THRESHOLD: f32 = 0.4;
const SKILL_MATCH: f32 = 1.0;
const TEXT_MATCH: f32 = 0.6;

// ────────────────────────────────────────────────────────────────────────────
// Output data models (shared across all scorer backends)
// ────────────────────────────────────────────────────────────────────────────

/// A JD keyword and how strongly the resume covers it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitMatch {
    pub keyword: String,
    pub evidence: String,
    pub strength: f32, // 0.0 – 1.0
}

/// A JD keyword the resume does not cover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    pub keyword: String,
    pub jd_frequency: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    pub overall_score: u32,             // 0 – 100
    pub strong_matches: Vec<FitMatch>,  // strength ≥ 0.8
    pub partial_matches: Vec<FitMatch>, // 0.4 – 0.79
    pub gaps: Vec<Gap>,                 // strength < 0.4
    pub recommendation: String,
    pub scorer_backend: String, // "keyword" | "llm"
}

impl FitReport {
    /// Score as the 0.0 – 1.0 fraction persisted on the opportunity.
    pub fn fit_fraction(&self) -> f64 {
        f64::from(self.overall_score.min(100)) / 100.0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait FitScorer: Send + Sync {
    async fn score(&self, resume: &ResumeRow, parsed_jd: &ParsedJD) -> Result<FitReport, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// KeywordFitScorer
// ────────────────────────────────────────────────────────────────────────────

/// Keyword-based fit scorer.
///
/// 1. For each keyword in `ParsedJD.keyword_inventory`:
///    - listed resume skill → 1.0
///    - appears in resume text → 0.6
///    - otherwise → 0.0
/// 2. overall_score = Σ(strength × weighted_score) / Σ(weighted_score) × 100
/// 3. Classify: strong (≥0.8), partial (0.4–0.79), gap (<0.4)
pub struct KeywordFitScorer;

#[async_trait]
impl FitScorer for KeywordFitScorer {
    async fn score(&self, resume: &ResumeRow, parsed_jd: &ParsedJD) -> Result<FitReport, AppError> {
        Ok(compute_keyword_fit(resume, parsed_jd))
    }
}

fn compute_keyword_fit(resume: &ResumeRow, parsed_jd: &ParsedJD) -> FitReport {
    let keywords = &parsed_jd.keyword_inventory;

    if keywords.is_empty() {
        return FitReport {
            overall_score: 0,
            strong_matches: vec![],
            partial_matches: vec![],
            gaps: vec![],
            recommendation: "No keywords found in the posting; cannot score fit.".to_string(),
            scorer_backend: "keyword".to_string(),
        };
    }

    let skills: Vec<String> = resume.skills.iter().map(|s| s.to_lowercase()).collect();
    let resume_text = resume.to_text().to_lowercase();

    let mut strong_matches = Vec::new();
    let mut partial_matches = Vec::new();
    let mut gaps = Vec::new();

    let mut total_weighted = 0.0_f32;
    let mut total_score = 0.0_f32;

    for kw in keywords {
        let keyword_lower = kw.keyword.to_lowercase();
        total_weighted += kw.weighted_score;

        let (strength, evidence) = if skills.iter().any(|s| *s == keyword_lower) {
            (SKILL_MATCH, "listed skill".to_string())
        } else if resume_text.contains(&keyword_lower) {
            (TEXT_MATCH, "mentioned in resume".to_string())
        } else {
            (0.0, String::new())
        };

        total_score += strength * kw.weighted_score;

        if strength >= STRONG_THRESHOLD {
            strong_matches.push(FitMatch {
                keyword: kw.keyword.clone(),
                evidence,
                strength,
            });
        } else if strength >= PARTIAL_THRESHOLD {
            partial_matches.push(FitMatch {
                keyword: kw.keyword.clone(),
                evidence,
                strength,
            });
        } else {
            gaps.push(Gap {
                keyword: kw.keyword.clone(),
                jd_frequency: kw.frequency,
            });
        }
    }

    let overall_score = if total_weighted > 0.0 {
        ((total_score / total_weighted) * 100.0).round().clamp(0.0, 100.0) as u32
    } else {
        0
    };

    FitReport {
        overall_score,
        recommendation: build_recommendation(overall_score, &gaps),
        strong_matches,
        partial_matches,
        gaps,
        scorer_backend: "keyword".to_string(),
    }
}

fn build_recommendation(score: u32, gaps: &[Gap]) -> String {
    let top_gaps: Vec<&str> = gaps.iter().take(3).map(|g| g.keyword.as_str()).collect();

    if score >= 80 {
        "Strong fit. The resume directly covers the key requirements.".to_string()
    } else if score >= 60 {
        format!(
            "Good fit ({score}/100). Address in the cover letter: {}.",
            top_gaps.join(", ")
        )
    } else {
        format!(
            "Weak fit ({score}/100). Significant gaps: {}.",
            top_gaps.join(", ")
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmFitScorer
// ────────────────────────────────────────────────────────────────────────────

/// Semantic fit scorer via Claude.
pub struct LlmFitScorer(pub LlmClient);

#[derive(Debug, Deserialize)]
struct LlmFitVerdict {
    overall_score: u32,
    #[serde(default)]
    strong_matches: Vec<String>,
    #[serde(default)]
    partial_matches: Vec<String>,
    #[serde(default)]
    gaps: Vec<String>,
    #[serde(default)]
    recommendation: String,
}

#[async_trait]
impl FitScorer for LlmFitScorer {
    async fn score(&self, resume: &ResumeRow, parsed_jd: &ParsedJD) -> Result<FitReport, AppError> {
        let keywords_json = serde_json::to_string(&parsed_jd.top_keywords(25))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize keywords: {e}")))?;
        let prompt = FIT_SCORE_PROMPT_TEMPLATE
            .replace("{jd_summary}", &parsed_jd.summary())
            .replace("{keywords_json}", &keywords_json)
            .replace("{resume_text}", &resume.to_text());

        let verdict: LlmFitVerdict = self
            .0
            .call_json(&prompt, FIT_SCORE_SYSTEM)
            .await
            .map_err(|e| AppError::Llm(format!("Fit scoring failed: {e}")))?;

        Ok(verdict_to_report(verdict, parsed_jd))
    }
}

fn verdict_to_report(verdict: LlmFitVerdict, parsed_jd: &ParsedJD) -> FitReport {
    let frequency_of = |keyword: &str| {
        parsed_jd
            .keyword_inventory
            .iter()
            .find(|k| k.keyword.eq_ignore_ascii_case(keyword))
            .map(|k| k.frequency)
            .unwrap_or(1)
    };
    let as_matches = |items: Vec<String>, strength: f32| {
        items
            .into_iter()
            .map(|keyword| FitMatch {
                keyword,
                evidence: "llm judgement".to_string(),
                strength,
            })
            .collect::<Vec<_>>()
    };

    FitReport {
        overall_score: verdict.overall_score.min(100),
        gaps: verdict
            .gaps
            .into_iter()
            .map(|keyword| Gap {
                jd_frequency: frequency_of(&keyword),
                keyword,
            })
            .collect(),
        strong_matches: as_matches(verdict.strong_matches, SKILL_MATCH),
        partial_matches: as_matches(verdict.partial_matches, TEXT_MATCH),
        recommendation: verdict.recommendation,
        scorer_backend: "llm".to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
