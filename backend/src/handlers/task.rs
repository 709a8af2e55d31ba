//! HTTP handlers for worker task endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::WorkerTask;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::dispatcher::{CreateTaskInput, WorkerTaskQuery};
use crate::services::TaskDispatcher;
use crate::AppState;

/// Create a worker task
pub async fn create_task(
    State(state): State<AppState>,
    Json(input): Json<CreateTaskInput>,
) -> AppResult<(StatusCode, Json<WorkerTask>)> {
    let service = TaskDispatcher::new(state.db);
    let task = service.create_task(input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// List a worker's tasks
pub async fn list_worker_tasks(
    State(state): State<AppState>,
    Query(query): Query<WorkerTaskQuery>,
) -> AppResult<Json<Vec<WorkerTask>>> {
    let service = TaskDispatcher::new(state.db);
    let tasks = service.list_worker_tasks(query).await?;
    Ok(Json(tasks))
}

/// Get a task by ID
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<WorkerTask>> {
    let service = TaskDispatcher::new(state.db);
    let task = service.get(task_id).await?;
    Ok(Json(task))
}

/// Mark a task complete
pub async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<WorkerTask>> {
    let service = TaskDispatcher::new(state.db);
    let task = service.complete_task(task_id).await?;
    Ok(Json(task))
}
