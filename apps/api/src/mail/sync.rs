//! Mailbox → cache reconciliation.
//!
//! `sync_mailbox` always answers from the cache. With a token it first pulls
//! the newest page from the remote mailbox and upserts it by provider message
//! id; any remote or upsert failure falls back to the rows read before the
//! fetch. Only a failed initial cache read is an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::mail::{MailFolder, MailboxClient, RemoteMessage};
use crate::models::email::OutlookEmail;

/// Messages fetched per sync.
pub const PAGE_SIZE: u32 = 50;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Unknown mail folder '{0}'")]
    UnknownFolder(String),

    #[error("Failed to read email cache: {0}")]
    CacheRead(#[source] sqlx::Error),
}

/// Where the returned list came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SyncSource {
    /// Fresh cache after upserting `fetched` remote messages.
    Remote { fetched: usize },
    /// No token; cache only, remote untouched.
    NotConnected,
    /// Remote fetch or upsert failed; pre-sync cache returned.
    Fallback { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub emails: Vec<OutlookEmail>,
    #[serde(flatten)]
    pub source: SyncSource,
}

impl SyncOutcome {
    pub fn connected(&self) -> bool {
        !matches!(self.source, SyncSource::NotConnected)
    }
}

/// Local email cache keyed by `(user_id, message_id)`.
#[async_trait]
pub trait EmailCache: Send + Sync {
    /// Newest first.
    async fn list(&self, user_id: Uuid, folder: MailFolder) -> Result<Vec<OutlookEmail>, sqlx::Error>;

    /// Inserts or overwrites server-sourced fields. `is_starred` is local and
    /// survives the overwrite.
    async fn upsert(
        &self,
        user_id: Uuid,
        folder: MailFolder,
        messages: &[RemoteMessage],
    ) -> Result<(), sqlx::Error>;
}

pub async fn sync_mailbox(
    cache: &dyn EmailCache,
    remote: &dyn MailboxClient,
    user_id: Uuid,
    access_token: Option<&str>,
    folder: &str,
) -> Result<SyncOutcome, SyncError> {
    let folder =
        MailFolder::parse(folder).map_err(|_| SyncError::UnknownFolder(folder.to_string()))?;

    let cached = cache
        .list(user_id, folder)
        .await
        .map_err(SyncError::CacheRead)?;

    let Some(token) = access_token else {
        return Ok(SyncOutcome {
            emails: cached,
            source: SyncSource::NotConnected,
        });
    };

    let fetched = match remote.list_messages(token, folder, PAGE_SIZE).await {
        Ok(messages) => messages,
        Err(e) => {
            warn!(%user_id, folder = folder.as_str(), "Mailbox fetch failed, serving cache: {e}");
            return Ok(fallback(cached, format!("remote fetch failed: {e}")));
        }
    };

    if let Err(e) = cache.upsert(user_id, folder, &fetched).await {
        warn!(%user_id, folder = folder.as_str(), "Email cache upsert failed, serving cache: {e}");
        return Ok(fallback(cached, format!("cache update failed: {e}")));
    }

    match cache.list(user_id, folder).await {
        Ok(fresh) => {
            info!(%user_id, folder = folder.as_str(), fetched = fetched.len(), "Mailbox synced");
            Ok(SyncOutcome {
                emails: fresh,
                source: SyncSource::Remote {
                    fetched: fetched.len(),
                },
            })
        }
        Err(e) => {
            warn!(%user_id, folder = folder.as_str(), "Email cache re-read failed: {e}");
            Ok(fallback(cached, format!("cache re-read failed: {e}")))
        }
    }
}

fn fallback(cached: Vec<OutlookEmail>, reason: String) -> SyncOutcome {
    SyncOutcome {
        emails: cached,
        source: SyncSource::Fallback { reason },
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL cache
// ────────────────────────────────────────────────────────────────────────────

pub struct PgEmailCache {
    pool: PgPool,
}

impl PgEmailCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailCache for PgEmailCache {
    async fn list(&self, user_id: Uuid, folder: MailFolder) -> Result<Vec<OutlookEmail>, sqlx::Error> {
        sqlx::query_as::<_, OutlookEmail>(
            r#"
            SELECT * FROM outlook_emails
            WHERE user_id = $1 AND status = $2
            ORDER BY received_at DESC
            "#,
        )
        .bind(user_id)
        .bind(folder.as_str())
        .fetch_all(&self.pool)
        .await
    }

    async fn upsert(
        &self,
        user_id: Uuid,
        folder: MailFolder,
        messages: &[RemoteMessage],
    ) -> Result<(), sqlx::Error> {
        for m in messages {
            sqlx::query(
                r#"
                INSERT INTO outlook_emails
                    (user_id, message_id, subject, preview, sender, is_read, status, received_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (user_id, message_id) DO UPDATE SET
                    subject     = EXCLUDED.subject,
                    preview     = EXCLUDED.preview,
                    sender      = EXCLUDED.sender,
                    is_read     = EXCLUDED.is_read,
                    status      = EXCLUDED.status,
                    received_at = EXCLUDED.received_at
                "#,
            )
            .bind(user_id)
            .bind(&m.id)
            .bind(&m.subject)
            .bind(&m.preview)
            .bind(&m.sender)
            .bind(m.is_read)
            .bind(folder.as_str())
            .bind(m.received_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailFlagsUpdate {
    pub user_id: Uuid,
    pub is_read: Option<bool>,
    pub is_starred: Option<bool>,
    pub status: Option<String>,
}

/// Local flag changes on a cached message. Returns `None` if the row is not
/// the user's.
pub async fn update_email_flags(
    pool: &PgPool,
    id: Uuid,
    update: &EmailFlagsUpdate,
) -> Result<Option<OutlookEmail>, sqlx::Error> {
    sqlx::query_as::<_, OutlookEmail>(
        r#"
        UPDATE outlook_emails SET
            is_read    = COALESCE($3, is_read),
            is_starred = COALESCE($4, is_starred),
            status     = COALESCE($5, status)
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(update.user_id)
    .bind(update.is_read)
    .bind(update.is_starred)
    .bind(&update.status)
    .fetch_optional(pool)
    .await
}
