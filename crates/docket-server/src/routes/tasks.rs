use std::time::Duration;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docket_core::app::{ClaimTask, CompleteTask, Completion, CreateTask, ListTasks, UpdateProgress};
use docket_core::domain::{TaskHistory, TaskId, TaskTypeId};
use docket_core::scheduling::SortSpec;
use docket_core::{BrokerError, Task, TaskStatus};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn task_id(raw: &str) -> ApiResult<TaskId> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("'{raw}' is not a task id")))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    /// Type name.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Required; `null` has to be sent explicitly.
    #[serde(rename = "params", alias = "parameters")]
    pub parameters: Value,
    #[serde(default)]
    pub priority: i32,
    pub max_attempts: Option<u32>,
}

/// `POST /tasks`. A duplicate of an open task answers with that task.
pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<CreateBody>, JsonRejection>,
) -> ApiResult<Json<Task>> {
    let Json(body) = body?;
    let request = CreateTask {
        task_type: body.task_type,
        parameters: body.parameters,
        priority: body.priority,
        max_attempts: body.max_attempts,
    };
    Ok(Json(state.broker.create_task(request).await?))
}

#[derive(Debug, Deserialize)]
pub struct ClaimBody {
    pub worker_id: String,
    pub task_type_id: String,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub claim_timeout_secs: Option<u64>,
}

/// `POST /tasks/claim`: the claimed task, or `204 No Content` when none is available.
pub async fn claim(
    State(state): State<AppState>,
    body: Result<Json<ClaimBody>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body?;

    let task_type_id: TaskTypeId = body
        .task_type_id
        .parse()
        .map_err(|_| BrokerError::invalid("task_type_id", "is not a task type id"))?;
    let sort = SortSpec::parse(body.sort_by.as_deref(), body.sort_order.as_deref())?;

    let mut request = ClaimTask::new(body.worker_id, task_type_id).sort(sort);
    if let Some(secs) = body.claim_timeout_secs {
        if secs == 0 {
            return Err(BrokerError::invalid("claim_timeout_secs", "must be positive").into());
        }
        request = request.claim_timeout(Duration::from_secs(secs));
    }

    match state.broker.claim_task(request).await? {
        Some(task) => Ok(Json(task).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct CompleteBody {
    pub worker_id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// `false` makes a failure final even with attempts left.
    #[serde(default = "retry_by_default")]
    pub retry: bool,
}

fn retry_by_default() -> bool {
    true
}

pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<CompleteBody>, JsonRejection>,
) -> ApiResult<Json<Task>> {
    let task_id = task_id(&id)?;
    let Json(body) = body?;

    let completion = if body.success {
        Completion::Success {
            result: body.result,
        }
    } else {
        Completion::Failure {
            error: body.error,
            retry: body.retry,
        }
    };
    let request = CompleteTask {
        task_id,
        worker_id: body.worker_id,
        completion,
    };
    Ok(Json(state.broker.complete_task(request).await?))
}

#[derive(Debug, Deserialize)]
pub struct ProgressBody {
    pub worker_id: String,
    pub percent: i64,
    pub message: Option<String>,
}

pub async fn progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ProgressBody>, JsonRejection>,
) -> ApiResult<Json<Task>> {
    let task_id = task_id(&id)?;
    let Json(body) = body?;

    let request = UpdateProgress {
        task_id,
        worker_id: body.worker_id,
        percent: body.percent,
        message: body.message,
    };
    Ok(Json(state.broker.update_progress(request).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Type name.
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /tasks?type=&status=&limit=`, newest first.
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Task>>> {
    let Query(query) = query?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(|e| BrokerError::invalid("status", e.to_string()))?;

    let request = ListTasks {
        task_type: query.task_type,
        status,
        limit: query.limit,
    };
    Ok(Json(state.broker.list_tasks(request).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.broker.task(task_id(&id)?).await?))
}

pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TaskHistory>>> {
    Ok(Json(state.broker.task_history(task_id(&id)?).await?))
}
