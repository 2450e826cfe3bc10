//! Task state machine: four statuses and the named transitions between them.
//!
//! ```text
//!            Create
//!              │
//!              ▼
//!          ┌────────┐  Claim   ┌─────────┐ CompleteSuccess      ┌───────────┐
//!          │pending │─────────▶│ claimed │─────────────────────▶│ completed │
//!          └────────┘          └─────────┘                      └───────────┘
//!              ▲                 │  │  ▲
//!              │ CompleteFailure │  │  │ ReclaimByTimeout (claimed → claimed, new holder)
//!              └──────Retry──────┘  │  │
//!                                   │  └──┘
//!                                   │ CompleteFailureFinal          ┌────────┐
//!                                   └──────────────────────────────▶│ failed │
//!                                                                   └────────┘
//! ```
//!
//! `Transition::from_status` / `Transition::to_status` is the transition table; every
//! mutation of a task goes through exactly one of these transitions and is recorded
//! in the history ledger under the transition's name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a worker.
    Pending,

    /// Held by exactly one worker until completion or claim timeout.
    Claimed,

    /// Finished successfully.
    Completed,

    /// Failed permanently (retries exhausted or retry refused).
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Claimed,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Claimed => "claimed",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Statuses among which `dedup_key` must be unique.
    pub fn is_dedup_scoped(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Claimed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// Named state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// (none) → pending
    Create,
    /// pending → claimed
    Claim,
    /// claimed (claim older than the timeout) → claimed by the new worker
    ReclaimByTimeout,
    /// claimed → completed
    CompleteSuccess,
    /// claimed → pending, attempts remain
    CompleteFailureRetry,
    /// claimed → failed
    CompleteFailureFinal,
}

impl Transition {
    pub const ALL: [Transition; 6] = [
        Transition::Create,
        Transition::Claim,
        Transition::ReclaimByTimeout,
        Transition::CompleteSuccess,
        Transition::CompleteFailureRetry,
        Transition::CompleteFailureFinal,
    ];

    /// Source status, `None` for `Create`.
    pub fn from_status(self) -> Option<TaskStatus> {
        match self {
            Transition::Create => None,
            Transition::Claim => Some(TaskStatus::Pending),
            Transition::ReclaimByTimeout
            | Transition::CompleteSuccess
            | Transition::CompleteFailureRetry
            | Transition::CompleteFailureFinal => Some(TaskStatus::Claimed),
        }
    }

    /// Target status.
    pub fn to_status(self) -> TaskStatus {
        match self {
            Transition::Create | Transition::CompleteFailureRetry => TaskStatus::Pending,
            Transition::Claim | Transition::ReclaimByTimeout => TaskStatus::Claimed,
            Transition::CompleteSuccess => TaskStatus::Completed,
            Transition::CompleteFailureFinal => TaskStatus::Failed,
        }
    }

    /// Name recorded in the history ledger.
    pub fn as_str(self) -> &'static str {
        match self {
            Transition::Create => "created",
            Transition::Claim => "claimed",
            Transition::ReclaimByTimeout => "reclaimed",
            Transition::CompleteSuccess => "completed",
            Transition::CompleteFailureRetry => "retried",
            Transition::CompleteFailureFinal => "failed",
        }
    }

    /// Is `from → to` an edge of the table?
    pub fn permits(from: Option<TaskStatus>, to: TaskStatus) -> bool {
        Transition::ALL
            .iter()
            .any(|t| t.from_status() == from && t.to_status() == to)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
