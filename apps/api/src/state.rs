use std::sync::Arc;

use sqlx::PgPool;

use crate::background_checks::TransactionalMailer;
use crate::config::Config;
use crate::identity::oauth::{MicrosoftOAuth, VerifierStore};
use crate::identity::session::SessionHub;
use crate::llm_client::LlmClient;
use crate::mail::MailboxClient;
use crate::notifications::NotificationBus;
use crate::recording::jobs::RecordingJobs;
use crate::recording::RecordingPipeline;
use crate::tasks::realtime::TaskFeed;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub llm: LlmClient,
    pub config: Config,
    /// Live per-user session view. Handlers read it; identity handlers write it.
    pub sessions: Arc<SessionHub>,
    pub oauth: MicrosoftOAuth,
    /// PKCE verifiers between link start and callback. Redis in production.
    pub verifiers: Arc<dyn VerifierStore>,
    pub mail: Arc<dyn MailboxClient>,
    /// Transactional mail for background-check letters.
    pub mailer: Arc<dyn TransactionalMailer>,
    pub notifications: NotificationBus,
    pub task_feed: TaskFeed,
    pub recordings: RecordingJobs,
    pub pipeline: Arc<RecordingPipeline>,
}
