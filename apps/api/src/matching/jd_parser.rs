//! JD Parser: extracts structured requirements, keywords, and tone from a job description.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::AppError;
use crate::llm_client::LlmClient;
use crate::matching::prompts::{JD_PARSE_PROMPT_TEMPLATE, JD_PARSE_SYSTEM};

/// Detected tone of a job description. Drives phrasing of the cover letter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum JDTone {
    AggressiveStartup,
    #[default]
    CollaborativeEnterprise,
    ResearchOriented,
    ProductOriented,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub text: String,
    pub is_required: bool,
}

/// High-level signals about the role shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleSignals {
    pub is_remote: bool,
    pub is_startup: bool,
    pub seniority: String,
    pub min_years_experience: Option<u32>,
}

/// A single keyword from the JD, weighted by position and frequency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub keyword: String,
    pub frequency: u32,
    /// title=1.0, requirements=0.8, responsibilities=0.6, about=0.3
    pub position_weight: f32,
    /// frequency * position_weight
    pub weighted_score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedJD {
    #[serde(default)]
    pub hard_requirements: Vec<Requirement>,
    #[serde(default)]
    pub soft_signals: Vec<String>,
    #[serde(default)]
    pub role_signals: RoleSignals,
    #[serde(default)]
    pub keyword_inventory: Vec<KeywordEntry>,
    #[serde(default)]
    pub detected_tone: JDTone,
}

impl ParsedJD {
    /// Short digest for prompts: tone plus the first few hard requirements.
    pub fn summary(&self) -> String {
        let requirements = self
            .hard_requirements
            .iter()
            .filter(|r| r.is_required)
            .take(5)
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>();
        format!(
            "Detected tone: {:?}. Seniority: {}. Hard requirements: {}",
            self.detected_tone,
            if self.role_signals.seniority.is_empty() {
                "unknown"
            } else {
                self.role_signals.seniority.as_str()
            },
            if requirements.is_empty() {
                "none stated".to_string()
            } else {
                requirements.join("; ")
            }
        )
    }

    /// Keywords ordered by weighted score, strongest first.
    pub fn top_keywords(&self, n: usize) -> Vec<&str> {
        let mut keywords: Vec<&KeywordEntry> = self.keyword_inventory.iter().collect();
        keywords.sort_by(|a, b| {
            b.weighted_score
                .partial_cmp(&a.weighted_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        keywords.into_iter().take(n).map(|k| k.keyword.as_str()).collect()
    }
}

const TITLE_FILLER: &[&str] = &["and", "for", "the", "with", "of", "in", "at", "to", "a", "an", "-", "/", "&"];
const SENIORITY_MARKERS: &[&str] = &["junior", "mid", "senior", "staff", "principal", "director"];

/// Structured view of a posting that only has a title. Every title word is a
/// keyword at title weight; seniority and remoteness are read off the title.
pub fn parse_title_only(title: &str) -> ParsedJD {
    let words: Vec<String> = title
        .split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty() && !TITLE_FILLER.contains(&w.as_str()))
        .collect();

    let seniority = SENIORITY_MARKERS
        .iter()
        .find(|marker| words.iter().any(|w| w.as_str() == **marker))
        .map(|marker| marker.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut keyword_inventory: Vec<KeywordEntry> = Vec::new();
    for word in &words {
        if word == "remote" || SENIORITY_MARKERS.contains(&word.as_str()) {
            continue;
        }
        match keyword_inventory.iter_mut().find(|k| &k.keyword == word) {
            Some(entry) => {
                entry.frequency += 1;
                entry.weighted_score += 1.0;
            }
            None => keyword_inventory.push(KeywordEntry {
                keyword: word.clone(),
                frequency: 1,
                position_weight: 1.0,
                weighted_score: 1.0,
            }),
        }
    }

    ParsedJD {
        role_signals: RoleSignals {
            is_remote: words.iter().any(|w| w == "remote"),
            is_startup: false,
            seniority,
            min_years_experience: None,
        },
        keyword_inventory,
        ..ParsedJD::default()
    }
}

/// Parses a job posting using the LLM and returns a structured `ParsedJD`.
pub async fn parse_jd(
    title: &str,
    company: &str,
    description: &str,
    llm: &LlmClient,
) -> Result<ParsedJD, AppError> {
    if description.trim().is_empty() {
        warn!("No description for '{title}' at {company}; parsing from the title alone");
        return Ok(parse_title_only(title));
    }
    let prompt = JD_PARSE_PROMPT_TEMPLATE
        .replace("{title}", title)
        .replace("{company}", company)
        .replace("{jd_text}", description);
    llm.call_json::<ParsedJD>(&prompt, JD_PARSE_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(format!("JD parsing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jd_tone_serde_variants() {
        for (json, tone) in [
            (r#""AggressiveStartup""#, JDTone::AggressiveStartup),
            (r#""CollaborativeEnterprise""#, JDTone::CollaborativeEnterprise),
            (r#""ResearchOriented""#, JDTone::ResearchOriented),
            (r#""ProductOriented""#, JDTone::ProductOriented),
        ] {
            let parsed: JDTone = serde_json::from_str(json).unwrap();
            assert_eq!(parsed, tone);
        }
    }

    #[test]
    fn test_parsed_jd_full_deserializes_correctly() {
        let json = r#"{
            "hard_requirements": [
                {"text": "5+ years Rust", "is_required": true},
                {"text": "Kafka", "is_required": false}
            ],
            "soft_signals": ["Kubernetes experience"],
            "role_signals": {
                "is_remote": true,
                "is_startup": true,
                "seniority": "senior",
                "min_years_experience": 5
            },
            "keyword_inventory": [
                {"keyword": "Rust", "frequency": 5, "position_weight": 0.8, "weighted_score": 4.0},
                {"keyword": "distributed systems", "frequency": 2, "position_weight": 0.6, "weighted_score": 1.2}
            ],
            "detected_tone": "AggressiveStartup"
        }"#;

        let parsed: ParsedJD = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.detected_tone, JDTone::AggressiveStartup);
        assert_eq!(parsed.hard_requirements.len(), 2);
        assert!(parsed.role_signals.is_remote);
        assert_eq!(parsed.role_signals.min_years_experience, Some(5));
        assert_eq!(parsed.keyword_inventory[0].keyword, "Rust");
    }

    #[test]
    fn test_partial_llm_output_falls_back_to_defaults() {
        let parsed: ParsedJD =
            serde_json::from_str(r#"{"keyword_inventory": []}"#).unwrap();
        assert_eq!(parsed.detected_tone, JDTone::CollaborativeEnterprise);
        assert!(parsed.hard_requirements.is_empty());
        assert_eq!(parsed.role_signals.seniority, "");
    }

    #[test]
    fn test_summary_lists_only_required_items() {
        let parsed = ParsedJD {
            hard_requirements: vec![
                Requirement { text: "Rust".to_string(), is_required: true },
                Requirement { text: "Go".to_string(), is_required: false },
            ],
            ..ParsedJD::default()
        };
        let summary = parsed.summary();
        assert!(summary.contains("Rust"));
        assert!(!summary.contains("Go"));
        assert!(summary.contains("Seniority: unknown"));
    }

    #[test]
    fn test_top_keywords_sorted_by_weight() {
        let parsed = ParsedJD {
            keyword_inventory: vec![
                KeywordEntry { keyword: "sql".to_string(), frequency: 1, position_weight: 0.3, weighted_score: 0.3 },
                KeywordEntry { keyword: "rust".to_string(), frequency: 4, position_weight: 1.0, weighted_score: 4.0 },
                KeywordEntry { keyword: "aws".to_string(), frequency: 2, position_weight: 0.6, weighted_score: 1.2 },
            ],
            ..ParsedJD::default()
        };
        assert_eq!(parsed.top_keywords(2), vec!["rust", "aws"]);
    }

    #[test]
    fn test_title_only_parse_reads_keywords_and_seniority() {
        let parsed = parse_title_only("Senior Backend Engineer (Rust, Remote)");
        let keywords: Vec<&str> = parsed
            .keyword_inventory
            .iter()
            .map(|k| k.keyword.as_str())
            .collect();
        assert_eq!(keywords, vec!["backend", "engineer", "rust"]);
        assert_eq!(parsed.role_signals.seniority, "senior");
        assert!(parsed.role_signals.is_remote);
        assert!(parsed.hard_requirements.is_empty());
    }

    #[tokio::test]
    async fn test_empty_description_parses_without_calling_the_llm() {
        // A real API call would fail on this key.
        let llm = LlmClient::new("not-a-real-key".to_string()).unwrap();
        let parsed = parse_jd("Backend Engineer", "Acme", "   ", &llm).await.unwrap();
        assert_eq!(parsed.top_keywords(2), vec!["backend", "engineer"]);
        assert_eq!(parsed.role_signals.seniority, "unknown");
        assert_eq!(parsed.detected_tone, JDTone::CollaborativeEnterprise);
    }
}
