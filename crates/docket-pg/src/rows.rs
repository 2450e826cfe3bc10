//! Row decoding. Every column is read with `try_get`; values that do not fit the
//! domain types surface as `StoreError::Corrupt`.

use chrono::{DateTime, Utc};
use docket_core::domain::{
    Id, IdMarker, StatusChange, StoreError, Task, TaskHistory, TaskStatus, TaskType,
};
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgRow;
use ulid::Ulid;

use crate::error::store_error;

pub(crate) const TASK_TYPE_COLUMNS: &str =
    "id, name, version, parameter_schema, active, created_at, updated_at";

pub(crate) const TASK_COLUMNS: &str = "id, task_type_id, task_type, status, parameters, \
     dedup_key, priority, result, error_message, attempts, max_attempts, claimed_by, \
     claimed_at, created_at, completed_at, progress, progress_message, revision";

pub(crate) const HISTORY_COLUMNS: &str =
    "id, task_id, status_change, worker_id, message, recorded_at";

fn corrupt(column: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{column}: {detail}"))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(store_error)
}

fn id<T: IdMarker>(row: &PgRow, column: &str) -> Result<Id<T>, StoreError> {
    let raw: String = get(row, column)?;
    Ulid::from_string(&raw)
        .map(Id::from_ulid)
        .map_err(|e| corrupt(column, e))
}

fn unsigned(row: &PgRow, column: &str) -> Result<u32, StoreError> {
    let raw: i32 = get(row, column)?;
    u32::try_from(raw).map_err(|e| corrupt(column, e))
}

pub(crate) fn task_type(row: &PgRow) -> Result<TaskType, StoreError> {
    Ok(TaskType {
        id: id(row, "id")?,
        name: get(row, "name")?,
        version: get(row, "version")?,
        parameter_schema: get(row, "parameter_schema")?,
        active: get(row, "active")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn task(row: &PgRow) -> Result<Task, StoreError> {
    let status: String = get(row, "status")?;
    let status: TaskStatus = status.parse().map_err(|e| corrupt("status", e))?;

    let progress: Option<i16> = get(row, "progress")?;
    let progress = progress
        .map(u8::try_from)
        .transpose()
        .map_err(|e| corrupt("progress", e))?;

    let revision: i64 = get(row, "revision")?;

    Ok(Task {
        id: id(row, "id")?,
        task_type_id: id(row, "task_type_id")?,
        task_type: get(row, "task_type")?,
        status,
        parameters: get(row, "parameters")?,
        dedup_key: get(row, "dedup_key")?,
        priority: get(row, "priority")?,
        result: get::<Option<Value>>(row, "result")?,
        error_message: get(row, "error_message")?,
        attempts: unsigned(row, "attempts")?,
        max_attempts: unsigned(row, "max_attempts")?,
        claimed_by: get(row, "claimed_by")?,
        claimed_at: get::<Option<DateTime<Utc>>>(row, "claimed_at")?,
        created_at: get(row, "created_at")?,
        completed_at: get::<Option<DateTime<Utc>>>(row, "completed_at")?,
        progress,
        progress_message: get(row, "progress_message")?,
        revision: u64::try_from(revision).map_err(|e| corrupt("revision", e))?,
    })
}

pub(crate) fn history(row: &PgRow) -> Result<TaskHistory, StoreError> {
    let change: String = get(row, "status_change")?;
    let status_change = StatusChange::parse(&change)
        .ok_or_else(|| corrupt("status_change", format!("unknown value '{change}'")))?;

    Ok(TaskHistory {
        id: id(row, "id")?,
        task_id: id(row, "task_id")?,
        status_change,
        worker_id: get(row, "worker_id")?,
        message: get(row, "message")?,
        timestamp: get(row, "recorded_at")?,
    })
}

/// Database form of the numeric task fields.
pub(crate) fn db_int(value: u32, column: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|e| corrupt(column, e))
}

pub(crate) fn db_revision(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|e| corrupt("revision", e))
}
