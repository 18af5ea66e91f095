use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::call_record::CallRecord;
use crate::recording::RecordingJob;
use crate::transcription::TranscriptionResult;

/// Status given to tasks created from a call's action items.
pub const FOLLOW_UP_TASK_STATUS: &str = "väntar";

/// Where a finished recording ends up.
#[async_trait]
pub trait CallRecordStore: Send + Sync {
    /// Updates the job's call record if it names one, otherwise inserts a new
    /// record for the contact.
    async fn save_outcome(
        &self,
        job: &RecordingJob,
        audio_url: &str,
        result: &TranscriptionResult,
    ) -> Result<CallRecord, sqlx::Error>;

    async fn create_follow_up_tasks(
        &self,
        user_id: Uuid,
        contact_label: &str,
        items: &[String],
    ) -> Result<usize, sqlx::Error>;
}

pub struct PgCallRecordStore {
    pool: PgPool,
}

impl PgCallRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRecordStore for PgCallRecordStore {
    async fn save_outcome(
        &self,
        job: &RecordingJob,
        audio_url: &str,
        result: &TranscriptionResult,
    ) -> Result<CallRecord, sqlx::Error> {
        match job.call_record_id {
            Some(id) => sqlx::query_as::<_, CallRecord>(
                r#"
                UPDATE call_records
                SET audio_url = $3, transcription = $4, action_plan = $5, updated_at = now()
                WHERE id = $1 AND user_id = $2
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(job.user_id)
            .bind(audio_url)
            .bind(&result.transcription)
            .bind(&result.action_plan)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(sqlx::Error::RowNotFound),
            None => {
                sqlx::query_as::<_, CallRecord>(
                    r#"
                    INSERT INTO call_records
                        (user_id, contact_name, contact_phone, audio_url, transcription, action_plan)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING *
                    "#,
                )
                .bind(job.user_id)
                .bind(&job.contact_label)
                .bind(&job.contact_phone)
                .bind(audio_url)
                .bind(&result.transcription)
                .bind(&result.action_plan)
                .fetch_one(&self.pool)
                .await
            }
        }
    }

    async fn create_follow_up_tasks(
        &self,
        user_id: Uuid,
        contact_label: &str,
        items: &[String],
    ) -> Result<usize, sqlx::Error> {
        let description = format!("Från samtal med {contact_label}");
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                "INSERT INTO tasks (user_id, title, description, status) VALUES ($1, $2, $3, $4)",
            )
            .bind(user_id)
            .bind(item)
            .bind(&description)
            .bind(FOLLOW_UP_TASK_STATUS)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(items.len())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Call record queries
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewCallRecord {
    pub user_id: Uuid,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
}

pub async fn list_call_records(pool: &PgPool, user_id: Uuid) -> Result<Vec<CallRecord>, sqlx::Error> {
    sqlx::query_as::<_, CallRecord>(
        "SELECT * FROM call_records WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn get_call_record(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> Result<Option<CallRecord>, sqlx::Error> {
    sqlx::query_as::<_, CallRecord>("SELECT * FROM call_records WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Stub written when a call starts; the recording pipeline fills in the rest.
pub async fn create_call_record(pool: &PgPool, new: &NewCallRecord) -> Result<CallRecord, sqlx::Error> {
    sqlx::query_as::<_, CallRecord>(
        r#"
        INSERT INTO call_records (user_id, contact_name, contact_phone)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(new.user_id)
    .bind(&new.contact_name)
    .bind(&new.contact_phone)
    .fetch_one(pool)
    .await
}
