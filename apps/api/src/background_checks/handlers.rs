use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::background_checks::{
    build_email, deliver, draft_letter, list_requests, record_request, CheckRequest,
};
use crate::errors::AppError;
use crate::models::background_check::BackgroundCheckRequest;
use crate::routes::UserIdQuery;
use crate::state::AppState;

/// POST /api/v1/background-checks
///
/// The attempt is stored whether or not delivery succeeds; a failed send
/// still answers with an error.
pub async fn handle_request_background_check(
    State(state): State<AppState>,
    Json(body): Json<CheckRequest>,
) -> Result<(StatusCode, Json<BackgroundCheckRequest>), AppError> {
    body.validate().map_err(AppError::Validation)?;

    let draft = draft_letter(&state.llm, &body).await?;
    let email = build_email(
        &state.config.background_check_sender,
        &state.config.background_check_recipient,
        &draft,
    );
    let delivery = deliver(state.mailer.as_ref(), &email).await;
    let record = record_request(&state.db, &body, &email, &delivery).await?;

    match delivery.error {
        Some(e) => Err(e.into()),
        None => Ok((StatusCode::CREATED, Json(record))),
    }
}

/// GET /api/v1/background-checks
pub async fn handle_list_background_checks(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<BackgroundCheckRequest>>, AppError> {
    Ok(Json(list_requests(&state.db, params.user_id).await?))
}
