//! Events - ドメインイベント
//!
//! サービスは状態を変えた後に `EventSink` へイベントを流します。
//! フォーマットや送信先は sink 側の責務です（コアは整形しない）。

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ids::{TaskId, TaskTypeId};

/// DomainEvent はドメインで発生したイベント
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    TypeRegistered {
        task_type_id: TaskTypeId,
        name: String,
        version: String,
        active: bool,
    },
    TypeDeactivated {
        task_type_id: TaskTypeId,
        name: String,
    },
    TaskCreated {
        task_id: TaskId,
        task_type: String,
        priority: i32,
        at: DateTime<Utc>,
    },
    /// Create returned an existing pending/claimed task.
    TaskDeduplicated {
        task_id: TaskId,
        task_type: String,
        dedup_key: String,
    },
    TaskClaimed {
        task_id: TaskId,
        worker_id: String,
        attempts: u32,
        at: DateTime<Utc>,
    },
    /// Claim took over an expired claim.
    TaskReclaimed {
        task_id: TaskId,
        worker_id: String,
        previous_worker: Option<String>,
        attempts: u32,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        worker_id: String,
        at: DateTime<Utc>,
    },
    TaskRetried {
        task_id: TaskId,
        worker_id: String,
        attempts: u32,
        max_attempts: u32,
    },
    TaskFailed {
        task_id: TaskId,
        worker_id: String,
        attempts: u32,
        error: Option<String>,
    },
    TaskProgress {
        task_id: TaskId,
        worker_id: String,
        percent: u8,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TypeRegistered { .. } => "type_registered",
            DomainEvent::TypeDeactivated { .. } => "type_deactivated",
            DomainEvent::TaskCreated { .. } => "task_created",
            DomainEvent::TaskDeduplicated { .. } => "task_deduplicated",
            DomainEvent::TaskClaimed { .. } => "task_claimed",
            DomainEvent::TaskReclaimed { .. } => "task_reclaimed",
            DomainEvent::TaskCompleted { .. } => "task_completed",
            DomainEvent::TaskRetried { .. } => "task_retried",
            DomainEvent::TaskFailed { .. } => "task_failed",
            DomainEvent::TaskProgress { .. } => "task_progress",
        }
    }

    /// Task the event is about (`None` for type events).
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            DomainEvent::TypeRegistered { .. } | DomainEvent::TypeDeactivated { .. } => None,
            DomainEvent::TaskCreated { task_id, .. }
            | DomainEvent::TaskDeduplicated { task_id, .. }
            | DomainEvent::TaskClaimed { task_id, .. }
            | DomainEvent::TaskReclaimed { task_id, .. }
            | DomainEvent::TaskCompleted { task_id, .. }
            | DomainEvent::TaskRetried { task_id, .. }
            | DomainEvent::TaskFailed { task_id, .. }
            | DomainEvent::TaskProgress { task_id, .. } => Some(*task_id),
        }
    }
}
