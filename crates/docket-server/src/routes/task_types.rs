use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use docket_core::TaskType;
use docket_core::domain::TypeRegistration;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

/// `POST /task-types/register` with `{name, version, schema}`.
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<TypeRegistration>, JsonRejection>,
) -> ApiResult<Json<TaskType>> {
    let Json(registration) = body?;
    Ok(Json(state.broker.register_type(registration).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TaskType>> {
    Ok(Json(state.broker.task_type(&name).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<TaskType>>> {
    let Query(query) = query?;
    Ok(Json(state.broker.task_types(query.active_only).await?))
}

pub async fn deactivate(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TaskType>> {
    Ok(Json(state.broker.deactivate_type(&name).await?))
}
