// Shared prompt fragments. Each module that calls the LLM keeps its own
// prompts.rs alongside it; only cross-cutting instructions live here.

/// Appended to every prompt that writes on the candidate's behalf.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Only use facts present in the candidate's resume. \
    Do NOT invent employers, titles, dates, metrics, degrees, or skills. \
    If the resume does not support a claim the job asks for, leave it out.";
