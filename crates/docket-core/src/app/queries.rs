//! Read-side operations: get / list tasks and read the history ledger.

use super::context::ServiceContext;
use crate::domain::{BrokerError, Task, TaskHistory, TaskId, TaskStatus};
use crate::ports::TaskFilter;

/// `List tasks` filters. `task_type` is a type name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListTasks {
    pub task_type: Option<String>,
    pub status: Option<TaskStatus>,
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct TaskQueries {
    ctx: ServiceContext,
}

impl TaskQueries {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn get(&self, id: TaskId) -> Result<Task, BrokerError> {
        self.ctx
            .store
            .task(id)
            .await?
            .ok_or(BrokerError::NotFound(id))
    }

    /// Newest first; an unknown type name is `TypeNotFound`.
    pub async fn list(&self, request: ListTasks) -> Result<Vec<Task>, BrokerError> {
        let task_type_id = match &request.task_type {
            Some(name) => Some(
                self.ctx
                    .store
                    .task_type_by_name(name)
                    .await?
                    .ok_or_else(|| BrokerError::TypeNotFound(name.clone()))?
                    .id,
            ),
            None => None,
        };

        let filter = TaskFilter {
            task_type_id,
            status: request.status,
            limit: self.ctx.config.list_limit(request.limit),
        };
        Ok(self.ctx.store.list_tasks(&filter).await?)
    }

    /// Ledger of one task, oldest first.
    pub async fn history(&self, id: TaskId) -> Result<Vec<TaskHistory>, BrokerError> {
        if self.ctx.store.task(id).await?.is_none() {
            return Err(BrokerError::NotFound(id));
        }
        Ok(self.ctx.store.task_history(id).await?)
    }
}
