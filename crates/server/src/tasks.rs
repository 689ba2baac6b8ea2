//! Task mutation endpoints.
//!
//! These are thin: the canonical task row commits first, then the matching
//! event is published as a side effect. Event delivery is best-effort by
//! contract, so a publish that degrades (or drops) never fails the
//! mutation that triggered it.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use frontdesk_core::domain::event::TaskEventKind;
use frontdesk_core::domain::task::{Task, TaskId, TaskStatus};
use frontdesk_core::errors::ApplicationError;
use frontdesk_db::repositories::TaskRepository;
use frontdesk_db::EventStore;

use crate::api::{reject, require_tenant, Rejection};

#[derive(Clone)]
pub struct TasksState {
    tasks: Arc<dyn TaskRepository>,
    events: Arc<EventStore>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub tenant_id: String,
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskActionRequest {
    pub tenant_id: String,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task: Task,
}

pub fn router(tasks: Arc<dyn TaskRepository>, events: Arc<EventStore>) -> Router {
    Router::new()
        .route("/api/v1/tasks", post(create_task))
        .route("/api/v1/tasks/{id}/accept", post(accept_task))
        .route("/api/v1/tasks/{id}/reject", post(reject_task))
        .with_state(TasksState { tasks, events })
}

pub async fn create_task(
    State(state): State<TasksState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), Rejection> {
    let tenant = require_tenant(Some(&request.tenant_id))?;
    let title = request.title.trim();
    if title.is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "title is required"));
    }

    let now = Utc::now();
    let task = Task {
        id: TaskId(Uuid::new_v4().simple().to_string()),
        tenant_id: tenant.clone(),
        title: title.to_string(),
        detail: request.detail.filter(|detail| !detail.trim().is_empty()),
        status: TaskStatus::Open,
        created_at: now,
        updated_at: now,
    };

    state
        .tasks
        .save(&task)
        .await
        .map_err(|error| reject(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;

    publish_task_event(&state.events, &task, TaskEventKind::Created).await;
    info!(
        event_name = "tasks.created",
        tenant_id = tenant.as_str(),
        task_id = %task.id.0,
        "task created"
    );

    Ok((StatusCode::CREATED, Json(TaskResponse { task })))
}

pub async fn accept_task(
    Path(id): Path<String>,
    State(state): State<TasksState>,
    Json(request): Json<TaskActionRequest>,
) -> Result<Json<TaskResponse>, Rejection> {
    transition_task(state, id, request.tenant_id, TaskStatus::Accepted).await
}

pub async fn reject_task(
    Path(id): Path<String>,
    State(state): State<TasksState>,
    Json(request): Json<TaskActionRequest>,
) -> Result<Json<TaskResponse>, Rejection> {
    transition_task(state, id, request.tenant_id, TaskStatus::Rejected).await
}

async fn transition_task(
    state: TasksState,
    id: String,
    tenant_id: String,
    next: TaskStatus,
) -> Result<Json<TaskResponse>, Rejection> {
    let tenant = require_tenant(Some(&tenant_id))?;
    let task_id = TaskId(id);

    let mut task = state
        .tasks
        .find_by_id(&tenant, &task_id)
        .await
        .map_err(|error| reject(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "task not found"))?;

    let correlation_id = Uuid::new_v4().simple().to_string();
    task.transition_to(next, Utc::now()).map_err(|error| {
        let interface = ApplicationError::from(error).into_interface(correlation_id.clone());
        reject(StatusCode::BAD_REQUEST, interface.user_message())
    })?;

    state
        .tasks
        .save(&task)
        .await
        .map_err(|error| reject(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;

    publish_task_event(&state.events, &task, TaskEventKind::StatusChanged).await;
    info!(
        event_name = "tasks.status_changed",
        tenant_id = tenant.as_str(),
        task_id = %task.id.0,
        status = task.status.as_str(),
        correlation_id = %correlation_id,
        "task status changed"
    );

    Ok(Json(TaskResponse { task }))
}

/// Publish is deliberately infallible from the mutation's point of view:
/// the row has already committed, so a degraded event path must not turn a
/// successful mutation into a user-facing error.
async fn publish_task_event(events: &EventStore, task: &Task, kind: TaskEventKind) {
    let payload = serde_json::to_value(task).unwrap_or(serde_json::Value::Null);
    events.publish(&task.tenant_id, kind, &task.id.0, payload).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::Json;
    use chrono::Utc;

    use frontdesk_core::cursor::Cursor;
    use frontdesk_core::domain::event::{TaskEventKind, TenantId};
    use frontdesk_core::domain::task::TaskStatus;
    use frontdesk_db::repositories::InMemoryTaskRepository;
    use frontdesk_db::EventStore;

    use super::{
        accept_task, create_task, reject_task, CreateTaskRequest, TaskActionRequest, TasksState,
    };

    fn state() -> (TasksState, Arc<EventStore>) {
        let events = Arc::new(EventStore::in_memory(100));
        let state =
            TasksState { tasks: Arc::new(InMemoryTaskRepository::default()), events: events.clone() };
        (state, events)
    }

    fn create_request(title: &str) -> Json<CreateTaskRequest> {
        Json(CreateTaskRequest {
            tenant_id: "acme-dental".to_string(),
            title: title.to_string(),
            detail: Some("caller asked for a callback".to_string()),
        })
    }

    fn action_request() -> Json<TaskActionRequest> {
        Json(TaskActionRequest { tenant_id: "acme-dental".to_string() })
    }

    #[tokio::test]
    async fn create_commits_the_row_and_publishes_a_created_event() {
        let (state, events) = state();
        let before = Cursor::at(Utc::now() - chrono::Duration::seconds(1));

        let (status, Json(response)) =
            create_task(State(state), create_request("Return Mrs. Alvarez's call"))
                .await
                .expect("create should succeed");

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response.task.status, TaskStatus::Open);

        let tenant = TenantId("acme-dental".to_string());
        let published = events.fetch(&tenant, Some(&before), 100).await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].kind, TaskEventKind::Created);
        assert_eq!(published[0].subject_id, response.task.id.0);
    }

    #[tokio::test]
    async fn create_rejects_blank_titles() {
        let (state, _) = state();
        let rejection = create_task(State(state), create_request("   ")).await.unwrap_err();
        assert_eq!(rejection.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn accept_transitions_and_publishes_a_status_change() {
        let (state, events) = state();
        let before = Cursor::at(Utc::now() - chrono::Duration::seconds(1));

        let (_, Json(created)) = create_task(State(state.clone()), create_request("Follow up"))
            .await
            .expect("create");

        let Json(accepted) =
            accept_task(Path(created.task.id.0.clone()), State(state), action_request())
                .await
                .expect("accept should succeed");
        assert_eq!(accepted.task.status, TaskStatus::Accepted);

        let tenant = TenantId("acme-dental".to_string());
        let published = events.fetch(&tenant, Some(&before), 100).await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].kind, TaskEventKind::StatusChanged);
    }

    #[tokio::test]
    async fn reject_of_a_rejected_task_is_a_bad_request() {
        let (state, _) = state();

        let (_, Json(created)) = create_task(State(state.clone()), create_request("Follow up"))
            .await
            .expect("create");

        reject_task(Path(created.task.id.0.clone()), State(state.clone()), action_request())
            .await
            .expect("first reject should succeed");

        let rejection =
            reject_task(Path(created.task.id.0.clone()), State(state), action_request())
                .await
                .unwrap_err();
        assert_eq!(rejection.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn accept_of_an_unknown_task_is_not_found() {
        let (state, _) = state();
        let rejection = accept_task(Path("missing".to_string()), State(state), action_request())
            .await
            .unwrap_err();
        assert_eq!(rejection.0, StatusCode::NOT_FOUND);
    }
}
