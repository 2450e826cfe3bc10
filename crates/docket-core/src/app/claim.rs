//! Claim Service.
//!
//! Eligible = tasks of the type that are pending, or claimed with
//! `claimed_at < now - claim_timeout` (lazy reclaim, no sweeper). The store
//! picks one with the scheduling strategy under its lock and applies the claim.
//! An empty eligible set is `Ok(None)`.

use std::time::Duration;

use tracing::Instrument;

use super::context::ServiceContext;
use super::retry::retry_on_conflict;
use crate::domain::{BrokerError, DomainEvent, Task, TaskTypeId, Transition};
use crate::ports::{ClaimSpec, Claimed};
use crate::scheduling::{FieldOrdering, SchedulingStrategy, SortSpec};

/// `Claim(worker_id, type_id, sort_by, sort_order, claim_timeout)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimTask {
    pub worker_id: String,
    pub task_type_id: TaskTypeId,
    pub sort: SortSpec,
    /// `None` takes `BrokerConfig::default_claim_timeout`.
    pub claim_timeout: Option<Duration>,
}

impl ClaimTask {
    pub fn new(worker_id: impl Into<String>, task_type_id: TaskTypeId) -> Self {
        Self {
            worker_id: worker_id.into(),
            task_type_id,
            sort: SortSpec::default(),
            claim_timeout: None,
        }
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn claim_timeout(mut self, timeout: Duration) -> Self {
        self.claim_timeout = Some(timeout);
        self
    }
}

#[derive(Clone)]
pub struct ClaimService {
    ctx: ServiceContext,
}

impl ClaimService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Claims with the request's field ordering.
    pub async fn claim(&self, request: ClaimTask) -> Result<Option<Task>, BrokerError> {
        let strategy = FieldOrdering(request.sort);
        self.claim_with(request, &strategy).await
    }

    /// Claims with a caller-supplied strategy (`request.sort` is ignored).
    pub async fn claim_with(
        &self,
        request: ClaimTask,
        strategy: &dyn SchedulingStrategy,
    ) -> Result<Option<Task>, BrokerError> {
        let span = tracing::info_span!(
            "claim_task",
            worker_id = %request.worker_id,
            task_type_id = %request.task_type_id,
        );
        self.claim_inner(request, strategy).instrument(span).await
    }

    async fn claim_inner(
        &self,
        request: ClaimTask,
        strategy: &dyn SchedulingStrategy,
    ) -> Result<Option<Task>, BrokerError> {
        let ctx = &self.ctx;

        if request.worker_id.trim().is_empty() {
            return Err(BrokerError::invalid("worker_id", "must not be empty"));
        }
        let claim_timeout = request
            .claim_timeout
            .unwrap_or(ctx.config.default_claim_timeout);

        // inactive types can still be drained
        if ctx.store.task_type(request.task_type_id).await?.is_none() {
            return Err(BrokerError::TypeNotFound(request.task_type_id.to_string()));
        }

        let request = &request;
        let claimed = retry_on_conflict(&ctx.config.conflict_retry, "claim_task", move || {
            let spec = ClaimSpec {
                task_type_id: request.task_type_id,
                worker_id: request.worker_id.clone(),
                now: ctx.clock.now(),
                claim_timeout,
                candidate_batch: ctx.config.claim_candidate_batch,
                history_id: ctx.ids.history_id(),
            };
            async move { Ok(ctx.store.claim_task(&spec, strategy).await?) }
        })
        .await?;

        let Some(Claimed {
            task,
            transition,
            previous_worker,
        }) = claimed
        else {
            tracing::debug!("no task available");
            return Ok(None);
        };

        let at = task.claimed_at.unwrap_or_else(|| ctx.clock.now());
        let event = match transition {
            Transition::ReclaimByTimeout => DomainEvent::TaskReclaimed {
                task_id: task.id,
                worker_id: request.worker_id.clone(),
                previous_worker,
                attempts: task.attempts,
                at,
            },
            _ => DomainEvent::TaskClaimed {
                task_id: task.id,
                worker_id: request.worker_id.clone(),
                attempts: task.attempts,
                at,
            },
        };
        tracing::debug!(task_id = %task.id, attempts = task.attempts, %transition, "task claimed");
        ctx.emit(event);
        Ok(Some(task))
    }
}
