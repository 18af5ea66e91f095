mod background_checks;
mod config;
mod consultants;
mod db;
mod errors;
mod identity;
mod llm_client;
mod mail;
mod models;
mod notifications;
mod profiles;
mod recording;
mod reports;
mod routes;
mod state;
mod tasks;
mod transcription;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::background_checks::ResendMailer;
use crate::config::Config;
use crate::db::create_pool;
use crate::identity::oauth::{MicrosoftOAuth, RedisVerifierStore};
use crate::identity::session::SessionHub;
use crate::llm_client::LlmClient;
use crate::mail::GraphMailClient;
use crate::notifications::NotificationBus;
use crate::recording::jobs::RecordingJobs;
use crate::recording::records::PgCallRecordStore;
use crate::recording::storage::S3AudioStore;
use crate::recording::RecordingPipeline;
use crate::routes::build_router;
use crate::state::AppState;
use crate::tasks::realtime::{forward_notifications, run_task_listener, TaskFeed};
use crate::transcription::RemoteTranscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("luna_api={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Luna API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize Redis (PKCE verifier storage)
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let notifications = NotificationBus::new();

    // Recording pipeline: S3 upload → transcription + action plan → call record
    let pipeline = RecordingPipeline::new(
        Arc::new(S3AudioStore::new(
            s3,
            config.s3_bucket.clone(),
            config.s3_public_url.clone(),
        )),
        Arc::new(RemoteTranscriber::new(
            config.openai_api_key.clone(),
            llm.clone(),
        )),
        Arc::new(PgCallRecordStore::new(db.clone())),
        notifications.clone(),
    );

    // Task change feed: Postgres LISTEN → feed → notifications
    let task_feed = TaskFeed::new();
    tokio::spawn(forward_notifications(
        task_feed.subscribe_all(),
        notifications.clone(),
    ));
    {
        let (db, feed) = (db.clone(), task_feed.clone());
        tokio::spawn(async move {
            if let Err(e) = run_task_listener(db, feed).await {
                error!("Task listener stopped: {e:#}");
            }
        });
    }

    // Build app state
    let state = AppState {
        db,
        llm,
        sessions: Arc::new(SessionHub::new()),
        oauth: MicrosoftOAuth::new(config.microsoft.clone()),
        verifiers: Arc::new(RedisVerifierStore::new(redis)),
        mail: Arc::new(GraphMailClient::new()),
        mailer: Arc::new(ResendMailer::new(config.resend_api_key.clone())),
        notifications,
        task_feed,
        recordings: RecordingJobs::new(),
        pipeline: Arc::new(pipeline),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the dashboard host once it has a fixed domain

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
        "luna-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
