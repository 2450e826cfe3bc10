//! In-memory TaskStore implementation.
//!
//! The whole state sits behind one `tokio::sync::Mutex`, so each trait method is
//! a transaction: claims are exclusive and check-or-insert is atomic. No lock is
//! held across an `.await` other than the mutex acquisition itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{StoreError, Task, TaskHistory, TaskId, TaskType, TaskTypeId};
use crate::ports::{ClaimSpec, Claimed, Insertion, TaskFilter, TaskStore};
use crate::scheduling::SchedulingStrategy;

#[derive(Default)]
struct MemoryState {
    /// All task types (single source of truth for types).
    types: HashMap<TaskTypeId, TaskType>,

    /// name -> id
    type_names: HashMap<String, TaskTypeId>,

    /// All tasks (single source of truth for tasks).
    tasks: HashMap<TaskId, Task>,

    /// dedup_key -> the pending/claimed task holding it.
    open_dedup_keys: HashMap<String, TaskId>,

    /// Append-only ledger, in insertion order.
    history: Vec<TaskHistory>,
}

impl MemoryState {
    /// Keeps `open_dedup_keys` in step with the task's status.
    fn index_dedup_key(&mut self, task: &Task) {
        if task.status.is_dedup_scoped() {
            self.open_dedup_keys.insert(task.dedup_key.clone(), task.id);
        } else if self.open_dedup_keys.get(&task.dedup_key) == Some(&task.id) {
            self.open_dedup_keys.remove(&task.dedup_key);
        }
    }
}

/// Process-local store for development and tests. Cloning shares the state.
#[derive(Clone, Default)]
pub struct MemoryTaskStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn upsert_task_type(&self, candidate: TaskType) -> Result<TaskType, StoreError> {
        let mut state = self.state.lock().await;

        let existing = state
            .type_names
            .get(&candidate.name)
            .and_then(|id| state.types.get(id))
            .cloned();

        let stored = match existing {
            Some(existing) => TaskType {
                id: existing.id,
                created_at: existing.created_at,
                active: true,
                ..candidate
            },
            None => TaskType {
                active: true,
                ..candidate
            },
        };

        state.type_names.insert(stored.name.clone(), stored.id);
        state.types.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn set_task_type_active(
        &self,
        name: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskType>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(id) = state.type_names.get(name).copied() else {
            return Ok(None);
        };
        let updated = state.types.get_mut(&id).map(|task_type| {
            task_type.active = active;
            task_type.updated_at = now;
            task_type.clone()
        });
        Ok(updated)
    }

    async fn task_type_by_name(&self, name: &str) -> Result<Option<TaskType>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .type_names
            .get(name)
            .and_then(|id| state.types.get(id))
            .cloned())
    }

    async fn task_type(&self, id: TaskTypeId) -> Result<Option<TaskType>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.types.get(&id).cloned())
    }

    async fn list_task_types(&self, active_only: bool) -> Result<Vec<TaskType>, StoreError> {
        let state = self.state.lock().await;
        let mut types: Vec<TaskType> = state
            .types
            .values()
            .filter(|t| t.active || !active_only)
            .cloned()
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    async fn insert_task(&self, task: Task, history: TaskHistory) -> Result<Insertion, StoreError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state
            .open_dedup_keys
            .get(&task.dedup_key)
            .and_then(|id| state.tasks.get(id))
        {
            return Ok(Insertion::Existing(existing.clone()));
        }

        if state.tasks.contains_key(&task.id) {
            return Err(StoreError::Conflict(format!("task {} already exists", task.id)));
        }

        state.index_dedup_key(&task);
        state.tasks.insert(task.id, task.clone());
        state.history.push(history);
        Ok(Insertion::Created(task))
    }

    async fn claim_task(
        &self,
        spec: &ClaimSpec,
        strategy: &dyn SchedulingStrategy,
    ) -> Result<Option<Claimed>, StoreError> {
        let mut state = self.state.lock().await;

        // The full eligible set is visible here, so `candidate_batch` does not apply.
        let candidates: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.task_type_id == spec.task_type_id)
            .filter(|t| t.claim_transition(spec.now, spec.claim_timeout).is_some())
            .cloned()
            .collect();

        let Some(chosen) = strategy.select(&candidates).map(|t| t.id) else {
            return Ok(None);
        };
        let Some(task) = state.tasks.get_mut(&chosen) else {
            return Ok(None);
        };

        // pending tasks have no holder, so this is only set on reclaim
        let previous_worker = task.claimed_by.clone();
        let Some(transition) = task.claim(&spec.worker_id, spec.now, spec.claim_timeout) else {
            return Ok(None);
        };
        let task = task.clone();

        state.history.push(
            TaskHistory::new(spec.history_id, task.id, transition, spec.now)
                .by_worker(spec.worker_id.clone()),
        );

        Ok(Some(Claimed {
            task,
            transition,
            previous_worker,
        }))
    }

    async fn update_task(
        &self,
        expected_revision: u64,
        task: &Task,
        history: &TaskHistory,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        let stored = state
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| StoreError::Conflict(format!("task {} vanished", task.id)))?;
        if stored.revision != expected_revision {
            return Err(StoreError::Conflict(format!(
                "task {} changed concurrently (revision {} != {})",
                task.id, stored.revision, expected_revision
            )));
        }
        *stored = task.clone();

        state.index_dedup_key(task);
        state.history.push(history.clone());
        Ok(())
    }

    async fn task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| filter.task_type_id.is_none_or(|id| t.task_type_id == id))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        // newest first
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        tasks.truncate(filter.limit);
        Ok(tasks)
    }

    async fn task_history(&self, id: TaskId) -> Result<Vec<TaskHistory>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.task_id == id)
            .cloned()
            .collect())
    }
}
