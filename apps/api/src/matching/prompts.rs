// LLM prompt constants for opportunity analysis.

/// System prompt for JD parsing: enforces JSON-only output.
pub const JD_PARSE_SYSTEM: &str =
    "You are an expert technical recruiter analysing job postings. \
    Extract structured information from a job description. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// JD parsing prompt. Replace `{title}`, `{company}`, `{jd_text}` before sending.
pub const JD_PARSE_PROMPT_TEMPLATE: &str = r#"Parse the following job posting and extract structured information.

Return a JSON object with this EXACT schema (no extra fields):
{
  "hard_requirements": [
    {"text": "5+ years backend development", "is_required": true}
  ],
  "soft_signals": [
    "Kubernetes experience a plus"
  ],
  "role_signals": {
    "is_remote": true,
    "is_startup": false,
    "seniority": "senior",
    "min_years_experience": 5
  },
  "keyword_inventory": [
    {
      "keyword": "Python",
      "frequency": 4,
      "position_weight": 0.8,
      "weighted_score": 3.2
    }
  ],
  "detected_tone": "CollaborativeEnterprise"
}

Rules:

POSITION WEIGHTS for keyword scoring:
- Title / header: 1.0
- Requirements section ("Required:", "Must have:", "You need:"): 0.8
- Responsibilities section ("You will:", "Responsibilities:"): 0.6
- About Us / company section: 0.3
weighted_score = frequency * position_weight

TONE OPTIONS (pick exactly one):
- "AggressiveStartup": "own", "drive", "move fast", "spearhead", "disrupt"
- "CollaborativeEnterprise": "partner", "collaborate", "contribute", "support teams"
- "ResearchOriented": "investigate", "publish", "evaluate", "propose"
- "ProductOriented": "ship", "launch", "deliver", "improve user experience"

SENIORITY: "junior", "mid", "senior", "staff", "principal", "director", or "unknown".
min_years_experience: the smallest number of years explicitly required, or null.

Keywords must be lowercase technical skills, tools, or domains, no filler words.

JOB TITLE: {title}
COMPANY: {company}

JOB DESCRIPTION:
{jd_text}"#;

/// System prompt for semantic fit scoring.
pub const FIT_SCORE_SYSTEM: &str =
    "You are a hiring manager judging how well a candidate matches a role. \
    Be strict and evidence-based. \
    You MUST respond with valid JSON only. \
    Do NOT use markdown code fences.";

/// Fit scoring prompt. Replace `{jd_summary}`, `{keywords_json}`, `{resume_text}`.
pub const FIT_SCORE_PROMPT_TEMPLATE: &str = r#"Analyse how well the candidate matches this role.

ROLE:
{jd_summary}

ROLE KEYWORDS (JSON):
{keywords_json}

CANDIDATE RESUME:
{resume_text}

Consider skills match, experience level, domain expertise, education requirements,
and location / remote preference.

Return a JSON object:
{
  "overall_score": 72,
  "strong_matches": ["python", "postgres"],
  "partial_matches": ["kubernetes"],
  "gaps": ["kafka"],
  "recommendation": "Good match; address the streaming gap in the cover letter."
}

overall_score is an integer 0-100:
- 90-100 perfect, 80-89 excellent, 60-79 good, 40-59 moderate, below 40 poor."#;
