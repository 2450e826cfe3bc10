//! Task Creation Service.
//!
//! fetch type → check active → validate params → dedup key → check-or-insert
//! (+ "created" history row). A duplicate of a pending/claimed task returns
//! that task unchanged.

use serde_json::Value;
use tracing::Instrument;

use super::context::ServiceContext;
use super::retry::retry_on_conflict;
use crate::dedup::dedup_key;
use crate::domain::{BrokerError, DomainEvent, NewTask, Task, TaskHistory, Transition};
use crate::ports::Insertion;
use crate::schema;

/// `Create(type_name, parameters, priority, max_attempts)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTask {
    pub task_type: String,
    pub parameters: Value,
    pub priority: i32,
    /// `None` takes `BrokerConfig::default_max_attempts`.
    pub max_attempts: Option<u32>,
}

impl CreateTask {
    pub fn new(task_type: impl Into<String>, parameters: Value) -> Self {
        Self {
            task_type: task_type.into(),
            parameters,
            priority: 0,
            max_attempts: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

#[derive(Clone)]
pub struct TaskCreationService {
    ctx: ServiceContext,
}

impl TaskCreationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, request: CreateTask) -> Result<Task, BrokerError> {
        let span = tracing::info_span!("create_task", task_type = %request.task_type);
        self.create_inner(request).instrument(span).await
    }

    async fn create_inner(&self, request: CreateTask) -> Result<Task, BrokerError> {
        let ctx = &self.ctx;

        let task_type = ctx
            .store
            .task_type_by_name(&request.task_type)
            .await?
            .ok_or_else(|| BrokerError::TypeNotFound(request.task_type.clone()))?;
        if !task_type.active {
            return Err(BrokerError::TypeInactive(task_type.name));
        }

        let max_attempts = request
            .max_attempts
            .unwrap_or(ctx.config.default_max_attempts);
        if max_attempts == 0 {
            return Err(BrokerError::invalid("max_attempts", "must be at least 1"));
        }

        schema::validate(&task_type.parameter_schema, &request.parameters).into_result()?;

        let key = dedup_key(&task_type.name, &request.parameters);

        let task_type = &task_type;
        let parameters = &request.parameters;
        let priority = request.priority;
        let key = key.as_str();
        let insertion = retry_on_conflict(&ctx.config.conflict_retry, "create_task", move || {
            let now = ctx.clock.now();
            let task = Task::from(NewTask {
                id: ctx.ids.task_id(),
                task_type_id: task_type.id,
                task_type: task_type.name.clone(),
                parameters: parameters.clone(),
                dedup_key: key.to_string(),
                priority,
                max_attempts,
                created_at: now,
            });
            let history = TaskHistory::new(ctx.ids.history_id(), task.id, Transition::Create, now);
            async move { Ok(ctx.store.insert_task(task, history).await?) }
        })
        .await?;

        match insertion {
            Insertion::Created(task) => {
                tracing::debug!(task_id = %task.id, priority = task.priority, "task created");
                ctx.emit(DomainEvent::TaskCreated {
                    task_id: task.id,
                    task_type: task.task_type.clone(),
                    priority: task.priority,
                    at: task.created_at,
                });
                Ok(task)
            }
            Insertion::Existing(task) => {
                tracing::debug!(task_id = %task.id, status = %task.status, "duplicate of an open task");
                ctx.emit(DomainEvent::TaskDeduplicated {
                    task_id: task.id,
                    task_type: task.task_type.clone(),
                    dedup_key: task.dedup_key.clone(),
                });
                Ok(task)
            }
        }
    }
}
