//! Tailored resume: the per-opportunity rewrite of the base resume.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::resume::ResumeRow;

const MAX_EMPHASIZED_SKILLS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TailoredResume {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub skills_to_emphasize: Vec<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub keywords_added: Vec<String>,
}

impl TailoredResume {
    /// Drops emphasised skills the base resume does not list (case-insensitive),
    /// de-duplicates the rest and caps the list.
    pub fn grounded_in(mut self, resume: &ResumeRow) -> Self {
        let known: HashSet<String> = resume.skills.iter().map(|s| s.to_lowercase()).collect();
        let mut seen = HashSet::new();
        let mut dropped = Vec::new();

        self.skills_to_emphasize.retain(|skill| {
            let key = skill.trim().to_lowercase();
            if !known.contains(&key) {
                dropped.push(skill.clone());
                return false;
            }
            seen.insert(key)
        });
        self.skills_to_emphasize.truncate(MAX_EMPHASIZED_SKILLS);
        self.highlights.retain(|h| !h.trim().is_empty());

        if !dropped.is_empty() {
            warn!(
                "Dropped {} ungrounded skill(s) from tailored resume {}: {:?}",
                dropped.len(),
                resume.id,
                dropped
            );
        }
        self
    }
}
