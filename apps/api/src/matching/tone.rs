//! Tone calibration: maps the detected JD tone to phrasing guidance for the cover letter.

use serde::Serialize;

use crate::matching::jd_parser::JDTone;

#[derive(Debug, Clone, Serialize)]
pub struct ToneGuide {
    pub register: &'static str,
    pub strong_verbs: Vec<&'static str>,
    pub avoid_phrases: Vec<&'static str>,
}

pub fn tone_guide(tone: &JDTone) -> ToneGuide {
    match tone {
        JDTone::AggressiveStartup => ToneGuide {
            register: "direct and energetic; lead with outcomes and ownership",
            strong_verbs: vec!["Built", "Shipped", "Owned", "Drove", "Launched"],
            avoid_phrases: vec!["I believe I could", "assisted with", "was involved in"],
        },
        JDTone::CollaborativeEnterprise => ToneGuide {
            register: "professional and team-oriented; emphasise partnership and reliability",
            strong_verbs: vec!["Partnered with", "Delivered", "Supported", "Collaborated on"],
            avoid_phrases: vec!["rockstar", "single-handedly", "disrupt"],
        },
        JDTone::ResearchOriented => ToneGuide {
            register: "precise and curious; emphasise rigour and evidence",
            strong_verbs: vec!["Investigated", "Evaluated", "Published", "Designed"],
            avoid_phrases: vec!["move fast", "hustle", "crushed"],
        },
        JDTone::ProductOriented => ToneGuide {
            register: "user-focused; emphasise shipped improvements and their impact",
            strong_verbs: vec!["Shipped", "Improved", "Launched", "Reduced"],
            avoid_phrases: vec!["researched", "theorised", "explored"],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tone_has_guidance() {
        for tone in [
            JDTone::AggressiveStartup,
            JDTone::CollaborativeEnterprise,
            JDTone::ResearchOriented,
            JDTone::ProductOriented,
        ] {
            let guide = tone_guide(&tone);
            assert!(!guide.strong_verbs.is_empty());
            assert!(!guide.avoid_phrases.is_empty());
        }
    }

    #[test]
    fn test_enterprise_avoids_startup_bravado() {
        let guide = tone_guide(&JDTone::CollaborativeEnterprise);
        assert!(guide.avoid_phrases.contains(&"single-handedly"));
        assert!(!guide.strong_verbs.contains(&"Owned"));
    }
}
