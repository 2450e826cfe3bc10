//! Completion Service: `Complete` and `UpdateProgress`.
//!
//! Both check ownership before touching anything: the task must be claimed and
//! `claimed_by` must equal the caller. Writes are guarded by the task revision
//! read at the start, so a concurrent claim/complete turns into a retried
//! `StoreConflict` rather than a lost update.

use serde_json::Value;
use tracing::Instrument;

use super::context::ServiceContext;
use super::retry::retry_on_conflict;
use crate::domain::{
    BrokerError, Decision, DomainEvent, StatusChange, Task, TaskHistory, TaskId, Transition,
};

/// What the worker reports.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Success {
        result: Option<Value>,
    },
    Failure {
        error: Option<String>,
        /// `false` makes the failure final regardless of remaining attempts.
        retry: bool,
    },
}

/// `Complete(task_id, worker_id, success, result|error)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteTask {
    pub task_id: TaskId,
    pub worker_id: String,
    pub completion: Completion,
}

impl CompleteTask {
    pub fn success(task_id: TaskId, worker_id: impl Into<String>, result: Option<Value>) -> Self {
        Self {
            task_id,
            worker_id: worker_id.into(),
            completion: Completion::Success { result },
        }
    }

    pub fn failure(task_id: TaskId, worker_id: impl Into<String>, error: Option<String>) -> Self {
        Self {
            task_id,
            worker_id: worker_id.into(),
            completion: Completion::Failure { error, retry: true },
        }
    }

    /// Final failure even when attempts remain.
    pub fn no_retry(mut self) -> Self {
        if let Completion::Failure { retry, .. } = &mut self.completion {
            *retry = false;
        }
        self
    }
}

/// `UpdateProgress(task_id, worker_id, percent, message)`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateProgress {
    pub task_id: TaskId,
    pub worker_id: String,
    pub percent: i64,
    pub message: Option<String>,
}

#[derive(Clone)]
pub struct CompletionService {
    ctx: ServiceContext,
}

impl CompletionService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn complete(&self, request: CompleteTask) -> Result<Task, BrokerError> {
        let span = tracing::info_span!(
            "complete_task",
            task_id = %request.task_id,
            worker_id = %request.worker_id,
        );
        self.complete_inner(request).instrument(span).await
    }

    async fn complete_inner(&self, request: CompleteTask) -> Result<Task, BrokerError> {
        let ctx = &self.ctx;
        let request = &request;

        let (task, transition) = retry_on_conflict(&ctx.config.conflict_retry, "complete_task", move || async move {
            let mut task = ctx
                .store
                .task(request.task_id)
                .await?
                .ok_or(BrokerError::NotFound(request.task_id))?;
            let expected_revision = task.revision;
            let now = ctx.clock.now();

            let (transition, message) = match &request.completion {
                Completion::Success { result } => {
                    let transition = task.complete_success(&request.worker_id, result.clone(), now)?;
                    (transition, None)
                }
                Completion::Failure { error, retry } => {
                    let (transition, decision) = task.complete_failure(
                        &request.worker_id,
                        error.clone(),
                        *retry,
                        ctx.decider.as_ref(),
                        now,
                    )?;
                    (transition, Some(failure_message(error.as_deref(), &decision)))
                }
            };

            let history = TaskHistory::new(ctx.ids.history_id(), task.id, transition, now)
                .by_worker(request.worker_id.clone())
                .with_message(message);
            ctx.store.update_task(expected_revision, &task, &history).await?;
            Ok((task, transition))
        })
        .await?;

        tracing::debug!(%transition, attempts = task.attempts, "task completion recorded");
        let worker_id = request.worker_id.clone();
        ctx.emit(match transition {
            Transition::CompleteSuccess => DomainEvent::TaskCompleted {
                task_id: task.id,
                worker_id,
                at: task.completed_at.unwrap_or_else(|| ctx.clock.now()),
            },
            Transition::CompleteFailureRetry => DomainEvent::TaskRetried {
                task_id: task.id,
                worker_id,
                attempts: task.attempts,
                max_attempts: task.max_attempts,
            },
            _ => DomainEvent::TaskFailed {
                task_id: task.id,
                worker_id,
                attempts: task.attempts,
                error: task.error_message.clone(),
            },
        });
        Ok(task)
    }

    /// Ownership + bounds check, then records progress. Status is unchanged.
    pub async fn update_progress(&self, request: UpdateProgress) -> Result<Task, BrokerError> {
        let span = tracing::info_span!(
            "update_progress",
            task_id = %request.task_id,
            worker_id = %request.worker_id,
        );
        self.update_progress_inner(request).instrument(span).await
    }

    async fn update_progress_inner(&self, request: UpdateProgress) -> Result<Task, BrokerError> {
        let ctx = &self.ctx;
        let request = &request;

        let task = retry_on_conflict(&ctx.config.conflict_retry, "update_progress", move || async move {
            let mut task = ctx
                .store
                .task(request.task_id)
                .await?
                .ok_or(BrokerError::NotFound(request.task_id))?;
            let expected_revision = task.revision;

            task.update_progress(&request.worker_id, request.percent, request.message.clone())?;

            let note = match &request.message {
                Some(message) => format!("{}% {message}", request.percent),
                None => format!("{}%", request.percent),
            };
            let history = TaskHistory::new(
                ctx.ids.history_id(),
                task.id,
                StatusChange::Progress,
                ctx.clock.now(),
            )
            .by_worker(request.worker_id.clone())
            .with_message(Some(note));
            ctx.store.update_task(expected_revision, &task, &history).await?;
            Ok(task)
        })
        .await?;

        ctx.emit(DomainEvent::TaskProgress {
            task_id: task.id,
            worker_id: request.worker_id.clone(),
            percent: task.progress.unwrap_or_default(),
        });
        Ok(task)
    }
}

/// History note of a failed attempt: the worker's error, then the decision reason.
fn failure_message(error: Option<&str>, decision: &Decision) -> String {
    match error {
        Some(error) => format!("{error} ({})", decision.reason()),
        None => decision.reason().to_string(),
    }
}
