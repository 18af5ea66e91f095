//! Mailbox access over Microsoft Graph, the local email cache, outbound mail,
//! and reusable email templates.
//!
//! - compose: plain text → HTML body, outgoing message validation
//! - sync: cache reconciliation (`sync_mailbox`)
//! - templates: saved templates with usage tracking

pub mod compose;
pub mod handlers;
pub mod sync;
pub mod templates;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::mail::compose::OutgoingMail;

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const MESSAGE_FIELDS: &str = "id,subject,bodyPreview,from,isRead,receivedDateTime";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mailbox token rejected")]
    Unauthorized,

    #[error("Mail API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unknown mail folder '{0}'")]
    UnknownFolder(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Folders the cache tracks. `as_str` is the cache `status` column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailFolder {
    Inbox,
    Archived,
    Drafts,
    Sent,
    Junk,
    Deleted,
}

impl MailFolder {
    pub fn parse(s: &str) -> Result<Self, MailError> {
        match s {
            "inbox" => Ok(MailFolder::Inbox),
            "archived" => Ok(MailFolder::Archived),
            "drafts" => Ok(MailFolder::Drafts),
            "sent" => Ok(MailFolder::Sent),
            "junk" => Ok(MailFolder::Junk),
            "deleted" => Ok(MailFolder::Deleted),
            other => Err(MailError::UnknownFolder(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MailFolder::Inbox => "inbox",
            MailFolder::Archived => "archived",
            MailFolder::Drafts => "drafts",
            MailFolder::Sent => "sent",
            MailFolder::Junk => "junk",
            MailFolder::Deleted => "deleted",
        }
    }

    /// Well-known folder name on the Graph side.
    pub fn graph_name(self) -> &'static str {
        match self {
            MailFolder::Inbox => "inbox",
            MailFolder::Archived => "archive",
            MailFolder::Drafts => "drafts",
            MailFolder::Sent => "sentitems",
            MailFolder::Junk => "junkemail",
            MailFolder::Deleted => "deleteditems",
        }
    }
}

/// The subset of a remote message the cache stores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteMessage {
    pub id: String,
    pub subject: Option<String>,
    pub preview: Option<String>,
    pub sender: Option<String>,
    pub is_read: bool,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Newest first, at most `limit` messages.
    async fn list_messages(
        &self,
        access_token: &str,
        folder: MailFolder,
        limit: u32,
    ) -> Result<Vec<RemoteMessage>, MailError>;

    async fn send_mail(&self, access_token: &str, mail: &OutgoingMail) -> Result<(), MailError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Graph wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    value: Vec<GraphMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body_preview: Option<String>,
    #[serde(default)]
    from: Option<GraphRecipient>,
    #[serde(default)]
    is_read: bool,
    received_date_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: GraphAddress,
}

#[derive(Debug, Deserialize)]
struct GraphAddress {
    #[serde(default)]
    address: Option<String>,
}

impl From<GraphMessage> for RemoteMessage {
    fn from(m: GraphMessage) -> Self {
        RemoteMessage {
            id: m.id,
            subject: m.subject,
            preview: m.body_preview,
            sender: m.from.and_then(|f| f.email_address.address),
            is_read: m.is_read,
            received_at: m.received_date_time,
        }
    }
}

fn recipients(addresses: &[String]) -> Vec<serde_json::Value> {
    addresses
        .iter()
        .map(|a| json!({ "emailAddress": { "address": a } }))
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// GraphMailClient
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct GraphMailClient {
    client: Client,
    base_url: String,
}

impl Default for GraphMailClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphMailClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: GRAPH_BASE.to_string(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, MailError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(MailError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl MailboxClient for GraphMailClient {
    async fn list_messages(
        &self,
        access_token: &str,
        folder: MailFolder,
        limit: u32,
    ) -> Result<Vec<RemoteMessage>, MailError> {
        let url = format!(
            "{}/me/mailFolders/{}/messages",
            self.base_url,
            folder.graph_name()
        );
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .query(&[
                ("$top", limit.to_string().as_str()),
                ("$orderby", "receivedDateTime desc"),
                ("$select", MESSAGE_FIELDS),
            ])
            .send()
            .await?;

        let page: MessagePage = Self::check(response).await?.json().await?;
        debug!("Fetched {} messages from {}", page.value.len(), folder.graph_name());
        Ok(page.value.into_iter().map(RemoteMessage::from).collect())
    }

    async fn send_mail(&self, access_token: &str, mail: &OutgoingMail) -> Result<(), MailError> {
        let body = json!({
            "message": {
                "subject": mail.subject,
                "body": { "contentType": "HTML", "content": mail.html },
                "toRecipients": recipients(&mail.to),
                "ccRecipients": recipients(&mail.cc),
                "bccRecipients": recipients(&mail.bcc),
            },
            "saveToSentItems": true
        });
        let response = self
            .client
            .post(format!("{}/me/sendMail", self.base_url))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
