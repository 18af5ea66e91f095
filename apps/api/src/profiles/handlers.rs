use axum::{
    extract::{Query, State},
    Json,
};

use crate::errors::AppError;
use crate::profiles::{get_or_create_profile, update_profile, Profile, ProfileUpdate};
use crate::routes::UserIdQuery;
use crate::state::AppState;

/// GET /api/v1/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Profile>, AppError> {
    let profile = get_or_create_profile(&state.db, params.user_id).await?;
    Ok(Json(profile))
}

/// PUT /api/v1/profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<Profile>, AppError> {
    body.validate().map_err(AppError::Validation)?;
    let profile = update_profile(&state.db, &body).await?;
    Ok(Json(profile))
}
