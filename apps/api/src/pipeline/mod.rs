//! The job-application pipeline: search → score → materials → approval →
//! submission → follow-ups, with state persisted behind `PipelineStore`.

pub mod followups;
pub mod handlers;
pub mod notify;
pub mod orchestrator;
pub mod rate_limit;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod submit;

#[cfg(test)]
pub mod testing;
