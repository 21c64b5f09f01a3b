use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::pipeline::orchestrator::JobApplicationPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Profile handlers talk to Postgres directly; everything else goes through the pipeline.
    pub db: PgPool,
    pub pipeline: Arc<JobApplicationPipeline>,
    pub config: Config,
}
