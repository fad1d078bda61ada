//! HTTP API handlers for the engine.
//!
//! Pure glue: every handler delegates to [`Engine`] operations and converts
//! the result into JSON DTOs. All JSON-facing numerics are f64; timestamps
//! are epoch seconds.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::SchedulerMode;
use crate::engine::{Engine, SystemInfo};
use crate::error::EngineError;
use crate::task::{Task, TaskStatus};

/// Shared application state.
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Creates the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Tasks
        .route("/tasks", post(submit_task))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}", delete(cancel_task))
        // System
        .route("/system", get(system_info))
        .route("/system/mode", post(set_mode))
        .route("/system/stop", post(stop_loop))
        .route("/system/clear", post(clear_history))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy" })
}

/// Submit a task.
async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let task = state.engine.submit(
        request.user_id,
        request.data_size,
        request.task_type,
        request.priority,
    )?;
    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}

/// Page through tasks.
async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Json<PageResponse> {
    let (tasks, total) =
        state
            .engine
            .page_tasks(query.offset, query.limit, query.user_id, query.status);
    Json(PageResponse {
        tasks: tasks.into_iter().map(TaskResponse::from).collect(),
        total,
    })
}

/// Get a single task.
async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.engine.get_task(&id)?;
    Ok(Json(TaskResponse::from(task)))
}

/// Cancel a task.
async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.cancel(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// System info: counts, flags, current slot, latest state.
async fn system_info(State(state): State<Arc<AppState>>) -> Json<SystemInfo> {
    Json(state.engine.system_info())
}

/// Switch the scheduler variant.
async fn set_mode(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<ModeResponse>, ApiError> {
    let mode: SchedulerMode = request
        .mode
        .parse()
        .map_err(EngineError::InvalidArgument)?;
    state.engine.set_scheduler_mode(mode);
    Ok(Json(ModeResponse { mode: request.mode }))
}

/// Stop the scheduling loop.
async fn stop_loop(State(state): State<Arc<AppState>>) -> StatusCode {
    state.engine.stop();
    StatusCode::ACCEPTED
}

/// Clear assignment and state history.
async fn clear_history(State(state): State<Arc<AppState>>) -> StatusCode {
    state.engine.clear_history();
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Task submission payload.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub user_id: u64,
    pub data_size: f64,
    #[serde(rename = "type", default)]
    pub task_type: String,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Paging query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

const fn default_limit() -> usize {
    20
}

/// Task view returned by the API.
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: String,
    pub user_id: u64,
    pub data_size: f64,
    #[serde(rename = "type")]
    pub task_type: String,
    pub priority: i32,
    pub status: TaskStatus,
    pub created_at: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            user_id: task.user_id,
            data_size: task.data_size,
            task_type: task.kind,
            priority: task.priority,
            status: task.status,
            created_at: epoch_seconds(task.created_at),
            scheduled_at: task.scheduled_at.map(epoch_seconds),
            completed_at: task.completed_at.map(epoch_seconds),
            cancelled_at: task.cancelled_at.map(epoch_seconds),
            failure_reason: task.failure_reason,
        }
    }
}

/// One page of tasks plus the total match count.
#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub tasks: Vec<TaskResponse>,
    pub total: usize,
}

/// Scheduler mode switch payload.
#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Debug, Serialize)]
struct ModeResponse {
    mode: String,
}

fn epoch_seconds(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Engine error wrapper carrying the HTTP mapping.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::UnknownUser(_) | EngineError::UnknownTask(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            EngineError::InvalidTransition { .. } | EngineError::AlreadyTerminal(_) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}
