use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::identity::oauth::{begin_link, complete_link, PROVIDER};
use crate::identity::session::{AuthEvent, LinkedIdentity, Session, SessionState};
use crate::identity::tokens::{delete_tokens, resolve_access_token, save_tokens};
use crate::routes::UserIdQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub identities: Vec<LinkedIdentity>,
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub user_id: Uuid,
    pub mailbox_connected: bool,
}

/// POST /api/v1/session
pub async fn handle_sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<SessionState>, AppError> {
    let provider_token = if req.identities.iter().any(|i| i.provider == PROVIDER) {
        resolve_access_token(&state.db, &state.oauth, &state.sessions, req.user_id).await?
    } else {
        None
    };

    state.sessions.apply(AuthEvent::SignedIn(Session {
        user_id: req.user_id,
        provider_token,
        identities: req.identities,
    }));
    Ok(Json(state.sessions.current(req.user_id)))
}

/// GET /api/v1/session
pub async fn handle_get_session(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Json<SessionState> {
    Json(state.sessions.current(params.user_id))
}

/// GET /api/v1/session/stream
///
/// Current session first, then every change. Closing the connection drops
/// the receiver.
pub async fn handle_session_stream(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sessions.subscribe(params.user_id);
    let stream = futures::stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first {
            rx.changed().await.ok()?;
        }
        let snapshot = rx.borrow_and_update().clone();
        let event = Event::default()
            .event("session")
            .json_data(&snapshot)
            .unwrap_or_else(|_| Event::default().comment("unserializable session"));
        Some((Ok(event), (rx, false)))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// DELETE /api/v1/session
pub async fn handle_sign_out(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> StatusCode {
    state.sessions.apply(AuthEvent::SignedOut {
        user_id: params.user_id,
    });
    StatusCode::NO_CONTENT
}

/// POST /api/v1/identity/microsoft/link
pub async fn handle_link_microsoft(
    State(state): State<AppState>,
    Json(req): Json<LinkRequest>,
) -> Result<Json<LinkResponse>, AppError> {
    if state.sessions.current(req.user_id).user_id.is_none() {
        return Err(AppError::Unauthorized);
    }
    let url = begin_link(&state.oauth, state.verifiers.as_ref(), req.user_id).await?;
    Ok(Json(LinkResponse { url }))
}

/// GET /api/v1/identity/microsoft/callback
pub async fn handle_microsoft_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<CallbackResponse>, AppError> {
    if let Some(error) = params.error {
        let detail = params.error_description.unwrap_or_default();
        warn!("Microsoft authorization denied: {error} {detail}");
        return Err(AppError::OAuth(format!("{error}: {detail}")));
    }
    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return Err(AppError::Validation("code and state are required".to_string()));
    };

    let (user_id, tokens) =
        complete_link(&state.oauth, state.verifiers.as_ref(), &oauth_state, &code).await?;
    save_tokens(&state.db, user_id, &tokens).await?;
    state
        .sessions
        .record_provider_token(user_id, tokens.access_token);

    Ok(Json(CallbackResponse {
        user_id,
        mailbox_connected: true,
    }))
}

/// DELETE /api/v1/identity/microsoft
pub async fn handle_unlink_microsoft(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<StatusCode, AppError> {
    delete_tokens(&state.db, params.user_id).await?;
    state.sessions.unlink_provider(params.user_id);
    Ok(StatusCode::NO_CONTENT)
}
