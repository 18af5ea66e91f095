//! In-memory collaborators for pipeline and job tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::call_record::CallRecord;
use crate::notifications::NotificationBus;
use crate::recording::records::CallRecordStore;
use crate::recording::storage::AudioStore;
use crate::recording::{AudioSource, CaptureError, ChunkedUpload, RecordingJob, RecordingPipeline};
use crate::transcription::{SpeechError, TranscriptionResult, Transcriber};

pub const PLAN: &str = "ÅTGÄRDER:\n- call back\nUPPFÖLJNING:\n...";

#[derive(Default)]
pub struct FakeStore {
    pub fail: bool,
    pub stored: Mutex<Vec<Bytes>>,
}

#[async_trait]
impl AudioStore for FakeStore {
    async fn store(&self, _user_id: Uuid, audio: Bytes) -> anyhow::Result<String> {
        if self.fail {
            anyhow::bail!("bucket unavailable");
        }
        self.stored.lock().push(audio);
        Ok("https://cdn.example/recordings/a.webm".to_string())
    }
}

#[derive(Default)]
pub struct FakeTranscriber {
    pub plan: String,
    pub fail: bool,
    /// When set, `transcribe` waits for a permit before answering.
    pub gate: Option<Arc<Notify>>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _: &str, _: &str) -> Result<TranscriptionResult, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(SpeechError::Api {
                status: 503,
                message: "overloaded".to_string(),
            });
        }
        Ok(TranscriptionResult {
            transcription: "hello".to_string(),
            action_plan: self.plan.clone(),
        })
    }
}

#[derive(Default)]
pub struct FakeRecords {
    pub fail_save: bool,
    /// Cancelled from inside `save_outcome`, as if the user hit cancel while
    /// the record was being written.
    pub cancel_during_save: Option<CancellationToken>,
    pub saved: Mutex<Vec<(Option<Uuid>, String)>>,
    pub tasks: Mutex<Vec<String>>,
}

#[async_trait]
impl CallRecordStore for FakeRecords {
    async fn save_outcome(
        &self,
        job: &RecordingJob,
        audio_url: &str,
        result: &TranscriptionResult,
    ) -> Result<CallRecord, sqlx::Error> {
        if let Some(cancel) = &self.cancel_during_save {
            cancel.cancel();
        }
        if self.fail_save {
            return Err(sqlx::Error::PoolTimedOut);
        }
        self.saved
            .lock()
            .push((job.call_record_id, result.action_plan.clone()));
        Ok(CallRecord {
            id: job.call_record_id.unwrap_or_else(Uuid::new_v4),
            user_id: job.user_id,
            contact_name: Some(job.contact_label.clone()),
            contact_phone: None,
            audio_url: Some(audio_url.to_string()),
            transcription: Some(result.transcription.clone()),
            action_plan: Some(result.action_plan.clone()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    async fn create_follow_up_tasks(
        &self,
        _: Uuid,
        _: &str,
        items: &[String],
    ) -> Result<usize, sqlx::Error> {
        self.tasks.lock().extend(items.iter().cloned());
        Ok(items.len())
    }
}

pub struct Fixture {
    pub pipeline: RecordingPipeline,
    pub store: Arc<FakeStore>,
    pub transcriber: Arc<FakeTranscriber>,
    pub records: Arc<FakeRecords>,
    pub bus: NotificationBus,
}

pub fn fixture(store: FakeStore, transcriber: FakeTranscriber, records: FakeRecords) -> Fixture {
    let store = Arc::new(store);
    let transcriber = Arc::new(transcriber);
    let records = Arc::new(records);
    let bus = NotificationBus::new();
    let pipeline =
        RecordingPipeline::new(store.clone(), transcriber.clone(), records.clone(), bus.clone());
    Fixture {
        pipeline,
        store,
        transcriber,
        records,
        bus,
    }
}

pub fn transcriber(plan: &str) -> FakeTranscriber {
    FakeTranscriber {
        plan: plan.to_string(),
        ..Default::default()
    }
}

pub fn job(user_id: Uuid, call_record_id: Option<Uuid>, create_tasks: bool) -> RecordingJob {
    RecordingJob {
        user_id,
        call_record_id,
        contact_label: "Anna Svensson".to_string(),
        contact_phone: None,
        create_tasks,
    }
}

/// A source that records whether it was released.
pub struct TrackedSource {
    pub inner: ChunkedUpload,
    pub deny: bool,
    pub released: Arc<AtomicBool>,
}

impl AudioSource for TrackedSource {
    fn acquire(&mut self) -> Result<(), CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied);
        }
        self.inner.acquire()
    }

    fn take_chunks(&mut self) -> Vec<Bytes> {
        self.inner.take_chunks()
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
        self.inner.release();
    }
}

pub fn source(chunks: &[&'static [u8]], deny: bool) -> (TrackedSource, Arc<AtomicBool>) {
    let released = Arc::new(AtomicBool::new(false));
    (
        TrackedSource {
            inner: ChunkedUpload::new(chunks.iter().copied().map(Bytes::from_static).collect()),
            deny,
            released: released.clone(),
        },
        released,
    )
}
