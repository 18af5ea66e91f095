//! Call recording pipeline.
//!
//! `idle → recording → uploading → transcribing → summarized → idle`.
//! Any failure returns the pipeline to `idle` and raises an error
//! notification. An uploaded file whose processing failed is left in storage.

#[cfg(test)]
mod fakes;
pub mod handlers;
pub mod jobs;
pub mod records;
pub mod storage;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::call_record::CallRecord;
use crate::notifications::{Notification, NotificationBus};
use crate::recording::records::CallRecordStore;
use crate::recording::storage::AudioStore;
use crate::transcription::action_items::extract_action_items;
use crate::transcription::Transcriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Recording,
    Uploading,
    Transcribing,
    Summarized,
}

impl RecordingState {
    /// Forward steps follow the pipeline order; returning to idle is always
    /// allowed.
    pub fn can_transition_to(self, next: RecordingState) -> bool {
        use RecordingState::*;
        matches!(
            (self, next),
            (Idle, Recording)
                | (Recording, Uploading)
                | (Uploading, Transcribing)
                | (Transcribing, Summarized)
                | (_, Idle)
        )
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Audio input access was denied")]
    PermissionDenied,

    #[error("No audio was captured")]
    Empty,
}

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Invalid recording transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: RecordingState,
        to: RecordingState,
    },

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Saving the call failed: {0}")]
    Persist(#[from] sqlx::Error),

    #[error("Recording was cancelled")]
    Cancelled,
}

// ────────────────────────────────────────────────────────────────────────────
// Capture
// ────────────────────────────────────────────────────────────────────────────

/// An audio input that yields chunks. `release` frees the underlying device
/// or buffer and must be safe to call more than once.
pub trait AudioSource: Send {
    fn acquire(&mut self) -> Result<(), CaptureError>;
    fn take_chunks(&mut self) -> Vec<Bytes>;
    fn release(&mut self);
}

/// Chunks the browser captured and uploaded.
#[derive(Debug, Default)]
pub struct ChunkedUpload {
    chunks: Vec<Bytes>,
    denied: bool,
}

impl ChunkedUpload {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks,
            denied: false,
        }
    }

    /// The client could not open its microphone.
    pub fn denied() -> Self {
        Self {
            chunks: Vec::new(),
            denied: true,
        }
    }
}

impl AudioSource for ChunkedUpload {
    fn acquire(&mut self) -> Result<(), CaptureError> {
        if self.denied {
            return Err(CaptureError::PermissionDenied);
        }
        if self.chunks.iter().all(|c| c.is_empty()) {
            return Err(CaptureError::Empty);
        }
        Ok(())
    }

    fn take_chunks(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.chunks)
    }

    fn release(&mut self) {
        self.chunks.clear();
    }
}

/// Owns an acquired source and guarantees it is released on stop or drop.
struct Recorder<S: AudioSource> {
    source: S,
    live: bool,
}

impl<S: AudioSource> Recorder<S> {
    fn start(mut source: S) -> Result<Self, CaptureError> {
        source.acquire()?;
        Ok(Self { source, live: true })
    }

    /// Concatenates everything captured into one audio object.
    fn stop(mut self) -> Result<Bytes, CaptureError> {
        let chunks = self.source.take_chunks();
        self.source.release();
        self.live = false;

        let mut audio = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
        for chunk in chunks {
            audio.extend_from_slice(&chunk);
        }
        if audio.is_empty() {
            return Err(CaptureError::Empty);
        }
        Ok(audio.freeze())
    }
}

impl<S: AudioSource> Drop for Recorder<S> {
    fn drop(&mut self) {
        if self.live {
            self.source.release();
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// One recording to process.
#[derive(Debug, Clone)]
pub struct RecordingJob {
    pub user_id: Uuid,
    /// Existing call record to fill in; `None` inserts a new one.
    pub call_record_id: Option<Uuid>,
    pub contact_label: String,
    pub contact_phone: Option<String>,
    pub create_tasks: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub call_record: CallRecord,
    pub action_items: Vec<String>,
    pub created_tasks: usize,
}

/// Publishes state changes and rejects out-of-order ones.
struct StateTracker<'a> {
    tx: &'a watch::Sender<RecordingState>,
}

impl StateTracker<'_> {
    fn advance(&self, next: RecordingState) -> Result<(), RecordingError> {
        let from = *self.tx.borrow();
        if !from.can_transition_to(next) {
            return Err(RecordingError::InvalidTransition { from, to: next });
        }
        self.tx.send_replace(next);
        Ok(())
    }
}

async fn unless_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = Result<T, RecordingError>>,
) -> Result<T, RecordingError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RecordingError::Cancelled),
        result = fut => result,
    }
}

pub struct RecordingPipeline {
    audio: Arc<dyn AudioStore>,
    transcriber: Arc<dyn Transcriber>,
    records: Arc<dyn CallRecordStore>,
    notifications: NotificationBus,
}

impl RecordingPipeline {
    pub fn new(
        audio: Arc<dyn AudioStore>,
        transcriber: Arc<dyn Transcriber>,
        records: Arc<dyn CallRecordStore>,
        notifications: NotificationBus,
    ) -> Self {
        Self {
            audio,
            transcriber,
            records,
            notifications,
        }
    }

    /// Runs the whole pipeline. The state channel ends at `idle` whatever the
    /// result; the user is notified of success or failure but not of
    /// cancellation.
    pub async fn run<S: AudioSource>(
        &self,
        job: &RecordingJob,
        source: S,
        state: &watch::Sender<RecordingState>,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, RecordingError> {
        let result = self.drive(job, source, state, cancel).await;
        state.send_replace(RecordingState::Idle);

        match &result {
            Ok(outcome) => {
                info!(
                    user_id = %job.user_id,
                    call_record_id = %outcome.call_record.id,
                    action_items = outcome.action_items.len(),
                    "Recording processed"
                );
                self.notifications.notify(
                    job.user_id,
                    Notification::success(
                        "Samtal analyserat",
                        format!(
                            "Samtalet med {} har transkriberats ({} åtgärder)",
                            job.contact_label,
                            outcome.action_items.len()
                        ),
                    ),
                );
            }
            Err(RecordingError::Cancelled) => {
                info!(user_id = %job.user_id, "Recording cancelled");
            }
            Err(e) => {
                warn!(user_id = %job.user_id, "Recording pipeline failed: {e}");
                self.notifications.notify(
                    job.user_id,
                    Notification::error("Inspelningen misslyckades", e.to_string()),
                );
            }
        }
        result
    }

    async fn drive<S: AudioSource>(
        &self,
        job: &RecordingJob,
        source: S,
        state: &watch::Sender<RecordingState>,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, RecordingError> {
        let tracker = StateTracker { tx: state };

        let recorder = Recorder::start(source)?;
        tracker.advance(RecordingState::Recording)?;

        let audio = recorder.stop()?;
        tracker.advance(RecordingState::Uploading)?;

        let audio_url = unless_cancelled(cancel, async {
            self.audio
                .store(job.user_id, audio)
                .await
                .map_err(|e| RecordingError::Upload(e.to_string()))
        })
        .await?;
        tracker.advance(RecordingState::Transcribing)?;

        let result = unless_cancelled(cancel, async {
            self.transcriber
                .transcribe(&audio_url, &job.contact_label)
                .await
                .map_err(|e| RecordingError::Transcription(e.to_string()))
        })
        .await?;
        tracker.advance(RecordingState::Summarized)?;

        if cancel.is_cancelled() {
            return Err(RecordingError::Cancelled);
        }

        let action_items = extract_action_items(&result.action_plan);
        let call_record = self.records.save_outcome(job, &audio_url, &result).await?;
        // A cancel that lands while the record is written still stops the
        // follow-up tasks and the success notification.
        if cancel.is_cancelled() {
            return Err(RecordingError::Cancelled);
        }
        let created_tasks = if job.create_tasks && !action_items.is_empty() {
            self.records
                .create_follow_up_tasks(job.user_id, &job.contact_label, &action_items)
                .await?
        } else {
            0
        };

        Ok(PipelineOutcome {
            call_record,
            action_items,
            created_tasks,
        })
    }
}
