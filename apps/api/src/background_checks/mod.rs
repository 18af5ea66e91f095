//! Background-check requests: an LLM drafts a formal letter, Resend delivers
//! it to the regulator, and every attempt is recorded.

pub mod handlers;
pub mod prompts;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::background_checks::prompts::{DRAFT_PROMPT, DRAFT_SYSTEM};
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, SWEDISH_BUSINESS_TONE};
use crate::llm_client::{LlmClient, LlmError};
use crate::mail::compose::plain_text_to_html;
use crate::models::background_check::BackgroundCheckRequest;

const RESEND_API_URL: &str = "https://api.resend.com/emails";
const DEFAULT_PURPOSE: &str = "Anställning inom vård och omsorg";

#[derive(Debug, Error)]
pub enum BackgroundCheckError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Email provider error (status {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Draft error: {0}")]
    Draft(#[from] LlmError),

    #[error("Draft is incomplete: {0}")]
    IncompleteDraft(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRequest {
    pub user_id: Uuid,
    pub consultant_name: String,
    pub personal_id: String,
    pub purpose: Option<String>,
    pub requester_name: Option<String>,
}

impl CheckRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.consultant_name.trim().is_empty() {
            return Err("consultant_name must not be empty".into());
        }
        if !is_personal_id(&self.personal_id) {
            return Err("personal_id must look like YYYYMMDD-XXXX".into());
        }
        Ok(())
    }
}

/// Swedish personnummer, 10 or 12 digits with an optional `-` or `+`
/// before the last four.
pub fn is_personal_id(s: &str) -> bool {
    let s = s.trim();
    if !s.is_ascii() {
        return false;
    }
    let (head, tail) = match s.rfind(['-', '+']) {
        Some(i) => (&s[..i], &s[i + 1..]),
        None if s.len() >= 4 => s.split_at(s.len() - 4),
        None => return false,
    };
    let all_digits = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
    all_digits(head) && all_digits(tail) && tail.len() == 4 && matches!(head.len(), 6 | 8)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Draft {
    pub subject: String,
    pub body: String,
}

impl Draft {
    fn check(self) -> Result<Self, BackgroundCheckError> {
        if self.subject.trim().is_empty() {
            return Err(BackgroundCheckError::IncompleteDraft("empty subject"));
        }
        if self.body.trim().is_empty() {
            return Err(BackgroundCheckError::IncompleteDraft("empty body"));
        }
        Ok(self)
    }
}

pub fn draft_prompt(req: &CheckRequest) -> String {
    DRAFT_PROMPT
        .replace("{name}", req.consultant_name.trim())
        .replace("{personal_id}", req.personal_id.trim())
        .replace("{purpose}", req.purpose.as_deref().unwrap_or(DEFAULT_PURPOSE))
        .replace("{requester}", req.requester_name.as_deref().unwrap_or("Luna"))
}

pub async fn draft_letter(llm: &LlmClient, req: &CheckRequest) -> Result<Draft, BackgroundCheckError> {
    let system = format!("{DRAFT_SYSTEM}\n{SWEDISH_BUSINESS_TONE}\n{JSON_ONLY_SYSTEM}");
    let draft: Draft = llm.call_json(&draft_prompt(req), &system).await?;
    draft.check()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionalEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait TransactionalMailer: Send + Sync {
    /// Sends the message and returns the provider's message id.
    async fn send(&self, email: &TransactionalEmail) -> Result<String, BackgroundCheckError>;
}

#[derive(Clone)]
pub struct ResendMailer {
    client: Client,
    api_key: String,
}

impl ResendMailer {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct ResendResponse {
    id: String,
}

#[async_trait]
impl TransactionalMailer for ResendMailer {
    async fn send(&self, email: &TransactionalEmail) -> Result<String, BackgroundCheckError> {
        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackgroundCheckError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: ResendResponse = response.json().await?;
        Ok(body.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

pub struct Delivery {
    pub status: DeliveryStatus,
    pub provider_id: Option<String>,
    pub error: Option<BackgroundCheckError>,
}

pub fn build_email(sender: &str, recipient: &str, draft: &Draft) -> TransactionalEmail {
    TransactionalEmail {
        from: sender.to_string(),
        to: vec![recipient.to_string()],
        subject: draft.subject.trim().to_string(),
        html: plain_text_to_html(&draft.body),
        text: draft.body.clone(),
    }
}

/// Sends the drafted letter. A provider failure is reported in the returned
/// `Delivery` rather than as an error so the attempt can still be recorded.
pub async fn deliver(mailer: &dyn TransactionalMailer, email: &TransactionalEmail) -> Delivery {
    match mailer.send(email).await {
        Ok(id) => {
            info!(provider_id = %id, "Background check request sent");
            Delivery {
                status: DeliveryStatus::Sent,
                provider_id: Some(id),
                error: None,
            }
        }
        Err(e) => {
            warn!("Background check request failed to send: {e}");
            Delivery {
                status: DeliveryStatus::Failed,
                provider_id: None,
                error: Some(e),
            }
        }
    }
}

pub async fn record_request(
    pool: &PgPool,
    req: &CheckRequest,
    email: &TransactionalEmail,
    delivery: &Delivery,
) -> Result<BackgroundCheckRequest, sqlx::Error> {
    sqlx::query_as::<_, BackgroundCheckRequest>(
        r#"
        INSERT INTO background_check_requests
            (user_id, consultant_name, personal_id, purpose, recipient, subject, body, status, provider_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(req.user_id)
    .bind(req.consultant_name.trim())
    .bind(req.personal_id.trim())
    .bind(&req.purpose)
    .bind(email.to.join(", "))
    .bind(&email.subject)
    .bind(&email.text)
    .bind(delivery.status.as_str())
    .bind(&delivery.provider_id)
    .fetch_one(pool)
    .await
}

pub async fn list_requests(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<BackgroundCheckRequest>, sqlx::Error> {
    sqlx::query_as::<_, BackgroundCheckRequest>(
        "SELECT * FROM background_check_requests WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}
