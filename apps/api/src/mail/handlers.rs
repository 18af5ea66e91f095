use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::identity::tokens::resolve_access_token;
use crate::mail::compose::{ComposeRequest, OutgoingMail};
use crate::mail::sync::{
    sync_mailbox, update_email_flags, EmailFlagsUpdate, PgEmailCache, SyncError, SyncOutcome,
};
use crate::mail::templates::{
    create_template, delete_template, list_templates, record_template_use, NewTemplate,
};
use crate::models::email::OutlookEmail;
use crate::models::template::EmailTemplate;
use crate::routes::UserIdQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MailboxQuery {
    pub user_id: Uuid,
    #[serde(default = "default_folder")]
    pub folder: String,
}

fn default_folder() -> String {
    "inbox".to_string()
}

#[derive(Debug, Serialize)]
pub struct MailboxResponse {
    pub connected: bool,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub message: ComposeRequest,
}

/// Token for the user's mailbox: the stored (and if needed refreshed) one,
/// else whatever the live session carries. Signed-out users get `None` even
/// when a stored token exists.
async fn mailbox_token(state: &AppState, user_id: Uuid) -> Result<Option<String>, AppError> {
    if state.sessions.current(user_id).user_id.is_none() {
        return Ok(None);
    }
    let stored = resolve_access_token(&state.db, &state.oauth, &state.sessions, user_id).await?;
    Ok(stored.or_else(|| state.sessions.current(user_id).provider_token))
}

/// GET /api/v1/emails
pub async fn handle_list_emails(
    State(state): State<AppState>,
    Query(params): Query<MailboxQuery>,
) -> Result<Json<MailboxResponse>, AppError> {
    let token = mailbox_token(&state, params.user_id).await?;
    let cache = PgEmailCache::new(state.db.clone());

    let outcome = sync_mailbox(
        &cache,
        state.mail.as_ref(),
        params.user_id,
        token.as_deref(),
        &params.folder,
    )
    .await
    .map_err(|e| match e {
        SyncError::UnknownFolder(_) => AppError::Validation(e.to_string()),
        SyncError::CacheRead(inner) => AppError::Database(inner),
    })?;

    Ok(Json(MailboxResponse {
        connected: outcome.connected(),
        outcome,
    }))
}

/// PATCH /api/v1/emails/:id
pub async fn handle_update_email(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<EmailFlagsUpdate>,
) -> Result<Json<OutlookEmail>, AppError> {
    update_email_flags(&state.db, id, &req)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Email {id} not found")))
}

/// POST /api/v1/emails/send
pub async fn handle_send_email(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<StatusCode, AppError> {
    let mail = OutgoingMail::from_plain_text(req.message)
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let token = mailbox_token(&state, req.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    state.mail.send_mail(&token, &mail).await?;
    tracing::info!(user_id = %req.user_id, recipients = mail.to.len(), "Sent email");
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/v1/email-templates
pub async fn handle_list_templates(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<EmailTemplate>>, AppError> {
    Ok(Json(list_templates(&state.db, params.user_id).await?))
}

/// POST /api/v1/email-templates
pub async fn handle_create_template(
    State(state): State<AppState>,
    Json(req): Json<NewTemplate>,
) -> Result<(StatusCode, Json<EmailTemplate>), AppError> {
    if req.name.trim().is_empty() || req.content.trim().is_empty() {
        return Err(AppError::Validation("name and content are required".to_string()));
    }
    let template = create_template(&state.db, &req).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// POST /api/v1/email-templates/:id/use
pub async fn handle_use_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UserIdQuery>,
) -> Result<Json<EmailTemplate>, AppError> {
    record_template_use(&state.db, req.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Template {id} not found")))
}

/// DELETE /api/v1/email-templates/:id
pub async fn handle_delete_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<StatusCode, AppError> {
    if delete_template(&state.db, params.user_id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Template {id} not found")))
    }
}
