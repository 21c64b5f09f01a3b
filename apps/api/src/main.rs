mod config;
mod db;
mod errors;
mod llm_client;
mod matching;
mod materials;
mod models;
mod pipeline;
mod profile;
mod routes;
mod sources;
mod state;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::materials::packet::S3PacketArchive;
use crate::materials::LlmJobAgent;
use crate::matching::fit_scoring::{FitScorer, KeywordFitScorer, LlmFitScorer};
use crate::pipeline::notify::RedisNotifier;
use crate::pipeline::orchestrator::JobApplicationPipeline;
use crate::pipeline::rate_limit::RedisRateLimiter;
use crate::pipeline::scheduler;
use crate::pipeline::store::PgStore;
use crate::pipeline::submit::{outbound_client, ManualSubmitter, Submitter, WebhookSubmitter};
use crate::routes::build_router;
use crate::sources::configured_boards;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Jobflow API v{}", env!("CARGO_PKG_VERSION"));

    // PostgreSQL (migrations run on connect)
    let db = create_pool(&config.database_url).await?;

    // Redis: one multiplexed connection shared by the rate limiter and notifier
    let redis = redis::Client::open(config.redis_url.clone())?;
    let redis_conn = redis.get_multiplexed_async_connection().await?;
    info!("Redis connection established");

    // S3 / MinIO for application packets
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let scorer: Arc<dyn FitScorer> = if config.enable_llm_fit_scoring {
        info!("Fit scoring: LLM");
        Arc::new(LlmFitScorer(llm.clone()))
    } else {
        info!("Fit scoring: keyword overlap");
        Arc::new(KeywordFitScorer)
    };

    let http = outbound_client()?;
    let boards = configured_boards(&config.boards, http.clone());
    if boards.is_empty() {
        info!("No job board keys configured; only manual applications will be processed");
    }

    let submitter: Arc<dyn Submitter> = match &config.submission_webhook_url {
        Some(url) => {
            info!("Submissions are handed to webhook {url}");
            Arc::new(WebhookSubmitter::new(http, url.clone()))
        }
        None => {
            info!("No submission webhook configured; packets are left for manual submission");
            Arc::new(ManualSubmitter)
        }
    };

    let pipeline = Arc::new(JobApplicationPipeline {
        store: Arc::new(PgStore::new(db.clone())),
        boards,
        agent: Arc::new(LlmJobAgent::new(llm)),
        scorer,
        submitter,
        limiter: Arc::new(RedisRateLimiter::new(redis_conn.clone())),
        notifier: Arc::new(RedisNotifier::new(redis_conn)),
        archive: Arc::new(S3PacketArchive::new(s3, config.s3_bucket.clone())),
        config: config.pipeline.clone(),
    });

    scheduler::spawn(pipeline.clone());

    let state = AppState {
        db,
        pipeline,
        config: config.clone(),
    };

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict origins once the web client has a fixed host
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "jobflow-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
