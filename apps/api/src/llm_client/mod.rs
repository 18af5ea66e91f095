//! Chat-completion client shared by call summaries and background-check
//! letters. Speech-to-text lives in `transcription`.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 2048;
const TEMPERATURE: f32 = 0.3;
const MAX_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [Turn<'a>; 1],
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct Reply {
    content: Vec<Block>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl Reply {
    /// Trimmed text of the first text block, if any.
    fn into_text(self) -> Option<String> {
        self.content.into_iter().find_map(|block| match block {
            Block::Text { text } if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        })
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

enum Attempt {
    Done(Reply),
    Retry(LlmError),
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// 1s before the second attempt, 2s before the third.
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1))
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Plain-text answer, trimmed.
    pub async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        self.ask(prompt, system).await
    }

    /// Answer parsed as JSON. The prompt must ask for JSON only; code fences
    /// around the answer are tolerated.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let text = self.ask(prompt, system).await?;
        Ok(serde_json::from_str(strip_json_fences(&text))?)
    }

    async fn ask(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let request = Request {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system,
            messages: [Turn {
                role: "user",
                content: prompt,
            }],
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send(&request).await? {
                Attempt::Done(reply) => return reply.into_text().ok_or(LlmError::EmptyContent),
                Attempt::Retry(e) if attempt < MAX_ATTEMPTS => {
                    let delay = backoff(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "LLM call failed, retrying: {e}");
                    tokio::time::sleep(delay).await;
                }
                Attempt::Retry(e) => return Err(e),
            }
        }
    }

    /// One HTTP round trip. Transport errors, 429 and 5xx are retryable;
    /// other non-success statuses fail immediately.
    async fn send(&self, request: &Request<'_>) -> Result<Attempt, LlmError> {
        let response = match self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ok(Attempt::Retry(LlmError::Http(e))),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(Attempt::Done(response.json().await?));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        let error = LlmError::Api {
            status: status.as_u16(),
            message,
        };
        if is_retryable(status) {
            Ok(Attempt::Retry(error))
        } else {
            Err(error)
        }
    }
}

/// Strips ```json ... ``` or ``` ... ``` fences.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    else {
        return text;
    };
    let inner = inner.trim_start();
    inner.strip_suffix("```").map(str::trim).unwrap_or(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"subject\": \"Begäran\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"subject\": \"Begäran\"}");
    }

    #[test]
    fn test_strip_json_fences_unterminated() {
        let input = "```\n{\"subject\": \"x\"}";
        assert_eq!(strip_json_fences(input), "{\"subject\": \"x\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "  {\"subject\": \"x\"} ";
        assert_eq!(strip_json_fences(input), "{\"subject\": \"x\"}");
    }

    #[test]
    fn test_reply_text_skips_non_text_blocks() {
        let reply: Reply = serde_json::from_str(
            r#"{"content":[{"type":"tool_use","id":"t1"},{"type":"text","text":"  hej \n"}],
                "usage":{"input_tokens":1,"output_tokens":1}}"#,
        )
        .unwrap();
        assert_eq!(reply.into_text().as_deref(), Some("hej"));
    }

    #[test]
    fn test_blank_reply_has_no_text() {
        let reply: Reply =
            serde_json::from_str(r#"{"content":[{"type":"text","text":"   "}]}"#).unwrap();
        assert!(reply.into_text().is_none());
    }

    #[test]
    fn test_retry_policy() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
    }
}
