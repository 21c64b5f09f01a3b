// LLM prompt constants for application materials.

/// System prompt for resume tailoring: enforces JSON-only output.
pub const TAILOR_SYSTEM: &str =
    "You are a resume writer adapting a candidate's existing resume to one job posting. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Tailoring prompt. Replace `{title}`, `{company}`, `{jd_summary}`, `{keywords}`,
/// `{resume_text}` and `{grounding}` before sending.
pub const TAILOR_PROMPT_TEMPLATE: &str = r#"Adapt the candidate's resume to this role.

ROLE: {title} at {company}
{jd_summary}

ROLE KEYWORDS: {keywords}

CANDIDATE RESUME:
{resume_text}

{grounding}

Return a JSON object with this EXACT schema:
{
  "summary": "Two or three sentences positioning the candidate for this role.",
  "skills_to_emphasize": ["rust", "postgres"],
  "highlights": ["Rephrased resume bullet that matters most for this role"],
  "keywords_added": ["event sourcing"]
}

Rules:
- skills_to_emphasize: only skills listed in the resume, most relevant first, at most 10.
- highlights: 3 to 6 bullets rephrased from the resume; keep every number as written.
- keywords_added: role keywords the summary or highlights now mention."#;

/// System prompt for cover letters: plain prose, no JSON.
pub const COVER_LETTER_SYSTEM: &str =
    "You are a candidate writing a cover letter in your own voice. \
    Respond with the letter text only: no subject line, no placeholders, no markdown.";

/// Cover letter prompt. Replace `{title}`, `{company}`, `{jd_summary}`, `{register}`,
/// `{strong_verbs}`, `{avoid_phrases}`, `{resume_text}` and `{grounding}`.
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"Write a cover letter for the {title} role at {company}.

ROLE:
{jd_summary}

TONE: {register}
Prefer verbs like: {strong_verbs}
Never write: {avoid_phrases}

CANDIDATE RESUME:
{resume_text}

{grounding}

Length: 250 to 400 words, three or four paragraphs.
Open with why this role, connect two or three concrete resume facts to the role,
and close with a short call to action. Sign off with the candidate's name if the
resume gives one, otherwise end after the closing line."#;
