use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::call_record::CallRecord;
use crate::recording::jobs::JobStatus;
use crate::recording::records::{
    create_call_record, get_call_record, list_call_records, NewCallRecord,
};
use crate::recording::{ChunkedUpload, RecordingJob, RecordingState};
use crate::routes::UserIdQuery;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RecordingAccepted {
    pub job_id: Uuid,
    pub state: RecordingState,
}

/// Multipart form: `user_id`, `contact_label`, optional `contact_phone`,
/// `call_record_id` and `create_tasks`, then one or more `chunk` parts.
/// A client that could not open its microphone sends
/// `capture_error=permission_denied` instead of chunks.
async fn read_recording_form(mut form: Multipart) -> Result<(RecordingJob, ChunkedUpload), AppError> {
    let mut user_id = None;
    let mut contact_label = None;
    let mut contact_phone = None;
    let mut call_record_id = None;
    let mut create_tasks = false;
    let mut capture_denied = false;
    let mut chunks: Vec<Bytes> = Vec::new();

    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "chunk" {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Malformed audio chunk: {e}")))?;
            chunks.push(data);
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::Validation(format!("Malformed field '{name}': {e}")))?;
        match name.as_str() {
            "user_id" => user_id = Some(parse_uuid("user_id", &value)?),
            "call_record_id" if !value.trim().is_empty() => {
                call_record_id = Some(parse_uuid("call_record_id", &value)?)
            }
            "contact_label" => contact_label = Some(value.trim().to_string()),
            "contact_phone" if !value.trim().is_empty() => {
                contact_phone = Some(value.trim().to_string())
            }
            "create_tasks" => create_tasks = value.trim() == "true",
            "capture_error" => capture_denied = value.trim() == "permission_denied",
            _ => {}
        }
    }

    let user_id = user_id.ok_or_else(|| AppError::Validation("user_id is required".into()))?;
    let contact_label = contact_label
        .filter(|l| !l.is_empty())
        .ok_or_else(|| AppError::Validation("contact_label is required".into()))?;

    Ok((
        RecordingJob {
            user_id,
            call_record_id,
            contact_label,
            contact_phone,
            create_tasks,
        },
        if capture_denied {
            ChunkedUpload::denied()
        } else {
            ChunkedUpload::new(chunks)
        },
    ))
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| AppError::Validation(format!("{field} must be a UUID")))
}

/// POST /api/v1/recordings
pub async fn handle_start_recording(
    State(state): State<AppState>,
    form: Multipart,
) -> Result<(StatusCode, Json<RecordingAccepted>), AppError> {
    let (job, source) = read_recording_form(form).await?;

    if let Some(id) = job.call_record_id {
        get_call_record(&state.db, job.user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Call record {id} not found")))?;
    }

    let job_id = state
        .recordings
        .spawn(state.pipeline.clone(), job, source);

    Ok((
        StatusCode::ACCEPTED,
        Json(RecordingAccepted {
            job_id,
            state: RecordingState::Idle,
        }),
    ))
}

/// GET /api/v1/recordings/:job_id
pub async fn handle_recording_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<JobStatus>, AppError> {
    state
        .recordings
        .status(job_id, params.user_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Recording job {job_id} not found")))
}

/// DELETE /api/v1/recordings/:job_id
pub async fn handle_cancel_recording(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<StatusCode, AppError> {
    if state.recordings.cancel(job_id, params.user_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Recording job {job_id} not found")))
    }
}

/// GET /api/v1/call-records
pub async fn handle_list_call_records(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<CallRecord>>, AppError> {
    Ok(Json(list_call_records(&state.db, params.user_id).await?))
}

/// POST /api/v1/call-records
pub async fn handle_create_call_record(
    State(state): State<AppState>,
    Json(req): Json<NewCallRecord>,
) -> Result<(StatusCode, Json<CallRecord>), AppError> {
    let record = create_call_record(&state.db, &req).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/call-records/:id
pub async fn handle_get_call_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<CallRecord>, AppError> {
    get_call_record(&state.db, params.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Call record {id} not found")))
}
