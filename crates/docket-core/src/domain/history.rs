//! TaskHistory - 追記専用の監査台帳
//!
//! 状態を変えるすべての操作が 1 行追記します。コアのロジックはこれを読みません。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{HistoryId, TaskId};
use super::state::Transition;

/// What a history row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChange {
    Created,
    Claimed,
    Reclaimed,
    Completed,
    Retried,
    Failed,
    /// Progress report; status unchanged.
    Progress,
}

impl StatusChange {
    pub const ALL: [StatusChange; 7] = [
        StatusChange::Created,
        StatusChange::Claimed,
        StatusChange::Reclaimed,
        StatusChange::Completed,
        StatusChange::Retried,
        StatusChange::Failed,
        StatusChange::Progress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatusChange::Progress => "progress",
            StatusChange::Created => Transition::Create.as_str(),
            StatusChange::Claimed => Transition::Claim.as_str(),
            StatusChange::Reclaimed => Transition::ReclaimByTimeout.as_str(),
            StatusChange::Completed => Transition::CompleteSuccess.as_str(),
            StatusChange::Retried => Transition::CompleteFailureRetry.as_str(),
            StatusChange::Failed => Transition::CompleteFailureFinal.as_str(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        StatusChange::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl From<Transition> for StatusChange {
    fn from(transition: Transition) -> Self {
        match transition {
            Transition::Create => StatusChange::Created,
            Transition::Claim => StatusChange::Claimed,
            Transition::ReclaimByTimeout => StatusChange::Reclaimed,
            Transition::CompleteSuccess => StatusChange::Completed,
            Transition::CompleteFailureRetry => StatusChange::Retried,
            Transition::CompleteFailureFinal => StatusChange::Failed,
        }
    }
}

impl fmt::Display for StatusChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHistory {
    pub id: HistoryId,
    pub task_id: TaskId,
    pub status_change: StatusChange,
    pub worker_id: Option<String>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskHistory {
    pub fn new(
        id: HistoryId,
        task_id: TaskId,
        status_change: impl Into<StatusChange>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_id,
            status_change: status_change.into(),
            worker_id: None,
            message: None,
            timestamp,
        }
    }

    pub fn by_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }
}
