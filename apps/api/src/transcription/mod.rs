//! Speech-to-text plus LLM action plan for recorded calls.
//!
//! `RemoteTranscriber` downloads the stored audio, sends it to the
//! speech-to-text endpoint, then asks the LLM for an action plan using the
//! transcription as context.

pub mod action_items;
pub mod prompts;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::llm_client::prompts::SWEDISH_BUSINESS_TONE;
use crate::llm_client::{LlmClient, LlmError};
use crate::transcription::prompts::{ACTION_PLAN_PROMPT, ACTION_PLAN_SYSTEM};

const SPEECH_API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const SPEECH_MODEL: &str = "whisper-1";
const SPEECH_LANGUAGE: &str = "sv";

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Audio download failed (status {0})")]
    Download(u16),

    #[error("Speech API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transcription was empty")]
    Empty,

    #[error("Action plan failed: {0}")]
    ActionPlan(#[from] LlmError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub transcription: String,
    pub action_plan: String,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio_url: &str,
        contact_label: &str,
    ) -> Result<TranscriptionResult, SpeechError>;
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    text: String,
}

pub struct RemoteTranscriber {
    client: Client,
    api_key: String,
    llm: LlmClient,
}

impl RemoteTranscriber {
    pub fn new(api_key: String, llm: LlmClient) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(300))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            llm,
        }
    }

    async fn download(&self, audio_url: &str) -> Result<Bytes, SpeechError> {
        let response = self.client.get(audio_url).send().await?;
        if !response.status().is_success() {
            return Err(SpeechError::Download(response.status().as_u16()));
        }
        Ok(response.bytes().await?)
    }

    async fn speech_to_text(&self, audio: Bytes) -> Result<String, SpeechError> {
        let file = Part::bytes(audio.to_vec())
            .file_name("recording.webm")
            .mime_str("audio/webm")?;
        let form = Form::new()
            .part("file", file)
            .text("model", SPEECH_MODEL)
            .text("language", SPEECH_LANGUAGE);

        let response = self
            .client
            .post(SPEECH_API_URL)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SpeechError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.json::<SpeechResponse>().await?.text;
        if text.trim().is_empty() {
            return Err(SpeechError::Empty);
        }
        Ok(text)
    }
}

pub fn action_plan_prompt(contact_label: &str, transcription: &str) -> String {
    ACTION_PLAN_PROMPT
        .replace("{contact}", contact_label)
        .replace("{transcription}", transcription)
}

#[async_trait]
impl Transcriber for RemoteTranscriber {
    async fn transcribe(
        &self,
        audio_url: &str,
        contact_label: &str,
    ) -> Result<TranscriptionResult, SpeechError> {
        let audio = self.download(audio_url).await?;
        debug!("Downloaded {} bytes of audio", audio.len());

        let transcription = self.speech_to_text(audio).await?;
        info!("Transcribed call with {contact_label} ({} chars)", transcription.len());

        let system = format!("{ACTION_PLAN_SYSTEM} {SWEDISH_BUSINESS_TONE}");
        let action_plan = self
            .llm
            .complete(&action_plan_prompt(contact_label, &transcription), &system)
            .await?;

        Ok(TranscriptionResult {
            transcription,
            action_plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::action_items::{ACTIONS_HEADER, FOLLOW_UP_HEADER};

    #[test]
    fn test_prompt_carries_contact_and_transcription() {
        let prompt = action_plan_prompt("Region Skåne", "Vi behöver en läkare.");
        assert!(prompt.contains("Call with: Region Skåne"));
        assert!(prompt.contains("Vi behöver en läkare."));
        assert!(!prompt.contains("{transcription}"));
    }

    #[test]
    fn test_prompt_uses_parsed_headers() {
        assert!(ACTION_PLAN_PROMPT.contains(ACTIONS_HEADER));
        assert!(ACTION_PLAN_PROMPT.contains(FOLLOW_UP_HEADER));
    }
}
