use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use taskq_broker::{ListFilter, QueueMetrics};
use taskq_core::{
    Priority, SubmitRequest, TaskError, TaskRecord, TaskStatus, TaskType,
};

use crate::auth::AuthGate;
use crate::service::TaskService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TaskService>,
    pub metrics: Arc<QueueMetrics>,
    pub gate: AuthGate,
}

/// HTTP surface over the task service. Mutating routes (submit, cancel)
/// sit behind the bearer gate; reads and health are open.
pub fn router(state: AppState) -> Router {
    let mutating = Router::new()
        .route("/api/v1/tasks", post(submit_task))
        .route("/api/v1/tasks/:task_id", delete(cancel_task))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .merge(mutating)
        .route("/api/v1/tasks", get(list_tasks))
        .route("/api/v1/tasks/:task_id", get(get_task))
        .route("/health", get(health_check))
        .route("/metrics", get(export_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if state.gate.verify(token) => Ok(next.run(request).await),
        None if !state.gate.enabled() => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized),
    }
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    task_type: TaskType,
    parameters: serde_json::Value,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<Priority>,
}

#[derive(Debug, Serialize)]
struct TaskResponse {
    task_id: Uuid,
    task_type: TaskType,
    status: TaskStatus,
    queue: String,
    priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    attempts: u32,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl From<TaskRecord> for TaskResponse {
    fn from(record: TaskRecord) -> Self {
        TaskResponse {
            task_id: record.task_id,
            task_type: record.task_type,
            status: record.status,
            queue: record.queue,
            priority: record.priority.value(),
            description: record.description,
            progress: record.progress,
            status_message: record.status_message,
            result: record.result,
            error: record.error,
            attempts: record.attempts,
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct TaskListResponse {
    tasks: Vec<TaskResponse>,
    total: usize,
    page: usize,
    page_size: usize,
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    task_id: Uuid,
    status: TaskStatus,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<usize>,
    page_size: Option<usize>,
    status: Option<String>,
    task_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    tracked_tasks: usize,
    pending_tasks: usize,
}

/// Submit a new task. Returns the PENDING record snapshot once the
/// message is queued.
async fn submit_task(
    State(state): State<AppState>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let record = state.service.submit(SubmitRequest {
        task_type: body.task_type,
        parameters: body.parameters,
        description: body.description,
        priority: body.priority,
    })?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// Get the tracked snapshot of one task.
async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskResponse>, ApiError> {
    let record = state.service.status(&task_id)?;
    Ok(Json(record.into()))
}

/// Request cancellation. Succeeds with the existing terminal state when
/// the task already finished.
async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let record = state.service.cancel(&task_id)?;
    let message = match record.status {
        TaskStatus::Revoked => format!("Task {task_id} has been cancelled"),
        status => format!("Task {task_id} already finished as {status}"),
    };

    Ok(Json(CancelResponse {
        task_id,
        status: record.status,
        message,
    }))
}

/// List tracked tasks with optional status/type filters and pagination.
async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let status = query
        .status
        .map(|s| {
            TaskStatus::from_str(&s).ok_or_else(|| ApiError::BadRequest(format!("Unknown status filter: {s}")))
        })
        .transpose()?;
    let task_type = query
        .task_type
        .map(|s| {
            TaskType::from_str(&s).ok_or_else(|| ApiError::BadRequest(format!("Unknown task type filter: {s}")))
        })
        .transpose()?;

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(10).clamp(1, 100);

    let page_result = state
        .service
        .list(ListFilter { status, task_type }, page, page_size);

    Ok(Json(TaskListResponse {
        tasks: page_result.tasks.into_iter().map(Into::into).collect(),
        total: page_result.total,
        page: page_result.page,
        page_size: page_result.page_size,
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        tracked_tasks: state.service.store().len(),
        pending_tasks: state
            .service
            .store()
            .count_by_status(TaskStatus::Pending),
    })
}

async fn export_metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| ApiError::Internal(e.to_string()))
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Unauthorized,
    ServiceUnavailable(String),
    Internal(String),
}

impl From<TaskError> for ApiError {
    fn from(error: TaskError) -> Self {
        match error {
            TaskError::Validation { .. } | TaskError::InvalidPriority(_) => {
                ApiError::BadRequest(error.to_string())
            }
            TaskError::NotFound(_) => ApiError::NotFound,
            TaskError::QueueClosed => ApiError::ServiceUnavailable(error.to_string()),
            TaskError::UnroutedTaskType(_) => ApiError::Internal(error.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Task not found".to_string()),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Missing or invalid bearer credential".to_string(),
            ),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
