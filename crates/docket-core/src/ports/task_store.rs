//! TaskStore port - 正本（source of truth）
//!
//! TaskStore は以下を管理します：
//! - task types（upsert / 非活性化のみ。削除しない）
//! - tasks（状態・所有者・試行回数）
//! - task history（追記専用）
//!
//! # 設計原則
//! - 状態変更と history 行の追記は同一トランザクション
//! - claim の排他はここで保証する（行ロック、またはプロセス内ロック）
//! - 重複チェックと insert は不可分（dedup_key は pending/claimed の中で一意）
//! - サービス側はリクエストをまたいで何もキャッシュしない
//!
//! # 実装
//! - `impls::MemoryTaskStore`: プロセス内（開発・テスト用）
//! - `docket-pg`: PostgreSQL

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    HistoryId, StoreError, Task, TaskHistory, TaskId, TaskStatus, TaskType, TaskTypeId, Transition,
};
use crate::scheduling::SchedulingStrategy;

/// Outcome of `insert_task`.
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    Created(Task),
    /// A pending/claimed task with the same dedup key already existed; returned unchanged.
    Existing(Task),
}

impl Insertion {
    pub fn task(&self) -> &Task {
        match self {
            Insertion::Created(task) | Insertion::Existing(task) => task,
        }
    }

    pub fn into_task(self) -> Task {
        match self {
            Insertion::Created(task) | Insertion::Existing(task) => task,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Insertion::Created(_))
    }
}

/// Parameters of one claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimSpec {
    pub task_type_id: TaskTypeId,
    pub worker_id: String,
    pub now: DateTime<Utc>,
    pub claim_timeout: Duration,
    /// Upper bound of rows locked while choosing.
    pub candidate_batch: usize,
    /// Id of the history row written for the claim.
    pub history_id: HistoryId,
}

/// A successful claim.
#[derive(Debug, Clone, PartialEq)]
pub struct Claimed {
    pub task: Task,
    /// `Claim` or `ReclaimByTimeout`.
    pub transition: Transition,
    /// Holder whose claim expired (reclaims only).
    pub previous_worker: Option<String>,
}

/// Filter of `list_tasks`. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFilter {
    pub task_type_id: Option<TaskTypeId>,
    pub status: Option<TaskStatus>,
    pub limit: usize,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert-or-update by name in one step.
    ///
    /// On update the stored `id` and `created_at` are kept; `version`,
    /// `parameter_schema` and `updated_at` are replaced and the type is reactivated.
    async fn upsert_task_type(&self, candidate: TaskType) -> Result<TaskType, StoreError>;

    /// `None` when no type has this name.
    async fn set_task_type_active(
        &self,
        name: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskType>, StoreError>;

    async fn task_type_by_name(&self, name: &str) -> Result<Option<TaskType>, StoreError>;

    async fn task_type(&self, id: TaskTypeId) -> Result<Option<TaskType>, StoreError>;

    /// Ordered by name.
    async fn list_task_types(&self, active_only: bool) -> Result<Vec<TaskType>, StoreError>;

    /// Check-or-insert by `dedup_key` among pending/claimed tasks, atomically.
    /// `history` is written only when the task is created.
    async fn insert_task(&self, task: Task, history: TaskHistory) -> Result<Insertion, StoreError>;

    /// Takes exactly one eligible task of the type (pending, or claimed with an
    /// expired claim), chosen by `strategy`, applies the claim transition and
    /// appends its history row. `None` when nothing is eligible.
    async fn claim_task(
        &self,
        spec: &ClaimSpec,
        strategy: &dyn SchedulingStrategy,
    ) -> Result<Option<Claimed>, StoreError>;

    /// Writes `task` if the stored revision is still `expected_revision`, and appends
    /// `history`. A stale revision is `StoreError::Conflict`.
    async fn update_task(
        &self,
        expected_revision: u64,
        task: &Task,
        history: &TaskHistory,
    ) -> Result<(), StoreError>;

    async fn task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;

    /// In insertion order.
    async fn task_history(&self, id: TaskId) -> Result<Vec<TaskHistory>, StoreError>;
}
