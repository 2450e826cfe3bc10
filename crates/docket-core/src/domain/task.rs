//! Task record and its state transitions.
//!
//! Every mutation goes through a method here that names the `Transition` it
//! performs; callers persist the task together with a history row for it.
//! `revision` is bumped on each mutation and lets stores reject stale writes.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::decision::{Decider, Decision};
use super::errors::BrokerError;
use super::ids::{TaskId, TaskTypeId};
use super::state::{TaskStatus, Transition};

/// Upper bound of `UpdateProgress.percent`.
pub const MAX_PROGRESS: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type_id: TaskTypeId,

    /// Name of the task type at creation time.
    #[serde(rename = "type")]
    pub task_type: String,

    pub status: TaskStatus,
    pub parameters: Value,
    pub dedup_key: String,
    pub priority: i32,
    pub result: Option<Value>,
    pub error_message: Option<String>,

    /// Number of claims so far (including a current one).
    pub attempts: u32,
    pub max_attempts: u32,

    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Reported by the holder; cleared on every claim.
    pub progress: Option<u8>,
    pub progress_message: Option<String>,

    #[serde(skip)]
    pub revision: u64,
}

/// Everything needed to admit a task, already resolved by the creation service.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub id: TaskId,
    pub task_type_id: TaskTypeId,
    pub task_type: String,
    pub parameters: Value,
    pub dedup_key: String,
    pub priority: i32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl From<NewTask> for Task {
    /// `Transition::Create`: a pending task with no attempts.
    fn from(new: NewTask) -> Self {
        Self {
            id: new.id,
            task_type_id: new.task_type_id,
            task_type: new.task_type,
            status: Transition::Create.to_status(),
            parameters: new.parameters,
            dedup_key: new.dedup_key,
            priority: new.priority,
            result: None,
            error_message: None,
            attempts: 0,
            max_attempts: new.max_attempts,
            claimed_by: None,
            claimed_at: None,
            created_at: new.created_at,
            completed_at: None,
            progress: None,
            progress_message: None,
            revision: 0,
        }
    }
}

/// Claims taken before this instant have expired.
///
/// Saturates instead of overflowing for absurd timeouts.
pub fn reclaim_cutoff(now: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(timeout)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl Task {
    /// Has the current claim outlived `timeout`?
    pub fn claim_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.status == TaskStatus::Claimed
            && self
                .claimed_at
                .is_some_and(|at| at < reclaim_cutoff(now, timeout))
    }

    /// Which claim transition applies right now, if any.
    pub fn claim_transition(&self, now: DateTime<Utc>, timeout: Duration) -> Option<Transition> {
        match self.status {
            TaskStatus::Pending => Some(Transition::Claim),
            TaskStatus::Claimed if self.claim_expired(now, timeout) => {
                Some(Transition::ReclaimByTimeout)
            }
            _ => None,
        }
    }

    /// `Claim` / `ReclaimByTimeout`. `None` when the task is not claimable.
    pub fn claim(
        &mut self,
        worker_id: &str,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Option<Transition> {
        let transition = self.claim_transition(now, timeout)?;
        self.status = transition.to_status();
        self.claimed_by = Some(worker_id.to_string());
        self.claimed_at = Some(now);
        self.attempts = self.attempts.saturating_add(1);
        self.progress = None;
        self.progress_message = None;
        self.revision += 1;
        Some(transition)
    }

    /// The task must be claimed, and by `worker_id`.
    pub fn ensure_owned_by(&self, worker_id: &str) -> Result<(), BrokerError> {
        if self.status != TaskStatus::Claimed {
            return Err(BrokerError::NotClaimed {
                task_id: self.id,
                status: self.status,
            });
        }
        if self.claimed_by.as_deref() != Some(worker_id) {
            return Err(BrokerError::NotOwner {
                task_id: self.id,
                worker_id: worker_id.to_string(),
            });
        }
        Ok(())
    }

    /// `CompleteSuccess`.
    pub fn complete_success(
        &mut self,
        worker_id: &str,
        result: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<Transition, BrokerError> {
        self.ensure_owned_by(worker_id)?;
        self.status = Transition::CompleteSuccess.to_status();
        self.result = result;
        self.claimed_by = None;
        self.completed_at = Some(now);
        self.revision += 1;
        Ok(Transition::CompleteSuccess)
    }

    /// `CompleteFailureRetry` or `CompleteFailureFinal`.
    ///
    /// With `allow_retry == false` the decider is skipped and the failure is final.
    /// The returned `Decision` carries the reason for the history row.
    pub fn complete_failure(
        &mut self,
        worker_id: &str,
        error: Option<String>,
        allow_retry: bool,
        decider: &dyn Decider,
        now: DateTime<Utc>,
    ) -> Result<(Transition, Decision), BrokerError> {
        self.ensure_owned_by(worker_id)?;

        let decision = if allow_retry {
            decider.decide(self)
        } else {
            Decision::Fail {
                reason: "retry refused by worker".to_string(),
            }
        };

        let transition = match &decision {
            Decision::Retry { .. } => {
                self.claimed_by = None;
                self.claimed_at = None;
                Transition::CompleteFailureRetry
            }
            Decision::Fail { .. } => {
                self.error_message = error;
                self.claimed_by = None;
                self.completed_at = Some(now);
                Transition::CompleteFailureFinal
            }
        };
        self.status = transition.to_status();
        self.revision += 1;
        Ok((transition, decision))
    }

    /// Progress report from the holder. Does not change `status`.
    pub fn update_progress(
        &mut self,
        worker_id: &str,
        percent: i64,
        message: Option<String>,
    ) -> Result<(), BrokerError> {
        self.ensure_owned_by(worker_id)?;
        let percent = u8::try_from(percent)
            .ok()
            .filter(|p| i64::from(*p) <= MAX_PROGRESS)
            .ok_or_else(|| {
                BrokerError::invalid("percent", format!("must be between 0 and {MAX_PROGRESS}"))
            })?;
        self.progress = Some(percent);
        self.progress_message = message;
        self.revision += 1;
        Ok(())
    }
}
