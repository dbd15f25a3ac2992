use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use shared::{
    Child, CreateChildRequest, CreateTaskRequest, HealthResponse, SweepResponse, Task,
    UpdateChildRequest, UpdateTaskRequest, UpdateTaskStatusRequest,
};
use tracing::info;

use crate::domain::{ChildService, ServiceError, TaskService};
use crate::mqtt::HomeAssistantPublisher;
use crate::scheduler::Scheduler;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub child_service: ChildService,
    pub task_service: TaskService,
    pub scheduler: Scheduler,
    pub publisher: HomeAssistantPublisher,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServiceError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            ServiceError::Store(e) => {
                tracing::error!("Store error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/children", get(list_children).post(create_child))
        .route(
            "/api/children/:id",
            get(get_child).put(update_child).delete(delete_child),
        )
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/:id", get(get_task).put(update_task).delete(delete_task))
        .route("/api/tasks/:id/status", patch(update_task_status))
        .route("/api/sweep", post(force_sweep))
        .route("/api/health", get(health))
        .with_state(state)
}

/// GET /api/children
async fn list_children(State(state): State<AppState>) -> Result<Json<Vec<Child>>, ServiceError> {
    Ok(Json(state.child_service.list_children().await?))
}

/// GET /api/children/:id
async fn get_child(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Child>, ServiceError> {
    Ok(Json(state.child_service.get_child(id).await?))
}

/// POST /api/children
async fn create_child(
    State(state): State<AppState>,
    Json(request): Json<CreateChildRequest>,
) -> Result<(StatusCode, Json<Child>), ServiceError> {
    info!("POST /api/children - name: {}", request.name);
    let child = state.child_service.create_child(request).await?;
    Ok((StatusCode::CREATED, Json(child)))
}

/// PUT /api/children/:id
async fn update_child(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateChildRequest>,
) -> Result<Json<Child>, ServiceError> {
    Ok(Json(state.child_service.update_child(id, request).await?))
}

/// DELETE /api/children/:id
async fn delete_child(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    state.child_service.delete_child(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Query parameters for the task list endpoint
#[derive(Deserialize, Debug)]
struct TaskListQuery {
    child_id: Option<i64>,
}

/// GET /api/tasks?child_id=N
async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>, ServiceError> {
    let tasks = match query.child_id {
        Some(child_id) => state.task_service.list_tasks_for_child(child_id).await?,
        None => state.task_service.list_tasks().await?,
    };
    Ok(Json(tasks))
}

/// GET /api/tasks/:id
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ServiceError> {
    Ok(Json(state.task_service.get_task(id).await?))
}

/// POST /api/tasks
async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ServiceError> {
    info!("POST /api/tasks - child_id: {}, title: {}", request.child_id, request.title);
    let task = state.task_service.create_task(request).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// PUT /api/tasks/:id
async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ServiceError> {
    Ok(Json(state.task_service.update_task(id, request).await?))
}

/// PATCH /api/tasks/:id/status
async fn update_task_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateTaskStatusRequest>,
) -> Result<Json<Task>, ServiceError> {
    info!("PATCH /api/tasks/{}/status - status: {}", id, request.status);
    Ok(Json(state.task_service.update_status(id, request.status).await?))
}

/// DELETE /api/tasks/:id
async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    state.task_service.delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sweep - interactive "force sweep" entry point
async fn force_sweep(State(state): State<AppState>) -> Response {
    info!("POST /api/sweep");
    match state.scheduler.tick(Utc::now()).await {
        Some(outcome) => Json(SweepResponse {
            reset_count: outcome.reset_count,
            failed_count: outcome.failed_count,
            affected_children: outcome.affected_children.into_iter().collect(),
        })
        .into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "A sweep is already running" })),
        )
            .into_response(),
    }
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        mqtt: if state.publisher.sink_connected() {
            "connected".to_string()
        } else {
            "disabled".to_string()
        },
    })
}
