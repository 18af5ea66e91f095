use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::task::{Task, TaskStatus};
use crate::routes::UserIdQuery;
use crate::state::AppState;
use crate::tasks::{create_task, delete_task, get_task, list_tasks, update_task, NewTask, TaskUpdate};

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub user_id: Uuid,
    pub status: Option<String>,
}

/// GET /api/v1/tasks
pub async fn handle_list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let status = params.status.as_deref().map(TaskStatus::from);
    let tasks = list_tasks(&state.db, params.user_id, status.as_ref()).await?;
    Ok(Json(tasks))
}

/// GET /api/v1/tasks/:id
pub async fn handle_get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Task>, AppError> {
    get_task(&state.db, params.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Task {id} not found")))
}

/// POST /api/v1/tasks
pub async fn handle_create_task(
    State(state): State<AppState>,
    Json(body): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    body.validate().map_err(AppError::Validation)?;
    let task = create_task(&state.db, &body).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// PATCH /api/v1/tasks/:id
pub async fn handle_update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TaskUpdate>,
) -> Result<Json<Task>, AppError> {
    body.validate().map_err(AppError::Validation)?;
    update_task(&state.db, id, &body)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Task {id} not found")))
}

/// DELETE /api/v1/tasks/:id
pub async fn handle_delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<StatusCode, AppError> {
    if delete_task(&state.db, params.user_id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Task {id} not found")))
    }
}

/// GET /api/v1/tasks/changes
///
/// Raw change events for the caller's tasks, so list views can refetch.
pub async fn handle_task_changes(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let sub = state.task_feed.subscribe(params.user_id);
    let stream = futures::stream::unfold(sub, |mut sub| async move {
        let change = sub.recv().await?;
        let event = Event::default()
            .event("task_change")
            .json_data(&change)
            .unwrap_or_else(|_| Event::default().comment("unserializable change"));
        Some((Ok(event), sub))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
