// Opportunity analysis: JD parsing, fit scoring against the base resume,
// and tone calibration for written materials.
// All LLM calls go through llm_client.

pub mod fit_scoring;
pub mod jd_parser;
pub mod prompts;
pub mod tone;
