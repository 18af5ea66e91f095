use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::consultants::{
    consultants_on_assignment, create_consultant, delete_consultant, get_consultant,
    list_consultants, update_consultant, ConsultantUpdate, ConsultantView, NewConsultant,
};
use crate::errors::AppError;
use crate::routes::UserIdQuery;
use crate::state::AppState;

/// GET /api/v1/consultants
pub async fn handle_list_consultants(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<ConsultantView>>, AppError> {
    let rows = list_consultants(&state.db, params.user_id).await?;
    let busy = consultants_on_assignment(&state.db, params.user_id).await?;
    let views = rows
        .into_iter()
        .map(|c| {
            let on_assignment = busy.contains(&c.id);
            ConsultantView::new(c, on_assignment)
        })
        .collect();
    Ok(Json(views))
}

/// GET /api/v1/consultants/:id
pub async fn handle_get_consultant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ConsultantView>, AppError> {
    let consultant = get_consultant(&state.db, params.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Consultant {id} not found")))?;
    let busy = consultants_on_assignment(&state.db, params.user_id).await?;
    Ok(Json(ConsultantView::new(consultant, busy.contains(&id))))
}

/// POST /api/v1/consultants
pub async fn handle_create_consultant(
    State(state): State<AppState>,
    Json(body): Json<NewConsultant>,
) -> Result<(StatusCode, Json<ConsultantView>), AppError> {
    body.validate().map_err(AppError::Validation)?;
    let consultant = create_consultant(&state.db, &body).await?;
    Ok((StatusCode::CREATED, Json(ConsultantView::new(consultant, false))))
}

/// PATCH /api/v1/consultants/:id
pub async fn handle_update_consultant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ConsultantUpdate>,
) -> Result<Json<ConsultantView>, AppError> {
    body.validate().map_err(AppError::Validation)?;
    let consultant = update_consultant(&state.db, id, &body)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Consultant {id} not found")))?;
    let busy = consultants_on_assignment(&state.db, body.user_id).await?;
    Ok(Json(ConsultantView::new(consultant, busy.contains(&id))))
}

/// DELETE /api/v1/consultants/:id
pub async fn handle_delete_consultant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<StatusCode, AppError> {
    if delete_consultant(&state.db, params.user_id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Consultant {id} not found")))
    }
}
