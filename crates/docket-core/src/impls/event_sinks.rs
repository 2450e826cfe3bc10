//! EventSink implementations.

use std::sync::{Mutex, PoisonError};

use crate::domain::DomainEvent;
use crate::ports::EventSink;

/// Emits every event as a structured `tracing` event (target `docket::events`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: DomainEvent) {
        let name = event.name();
        match event {
            DomainEvent::TypeRegistered {
                task_type_id,
                name: type_name,
                version,
                active,
            } => {
                tracing::info!(target: "docket::events", event = name, %task_type_id, task_type = %type_name, %version, active);
            }
            DomainEvent::TypeDeactivated {
                task_type_id,
                name: type_name,
            } => {
                tracing::info!(target: "docket::events", event = name, %task_type_id, task_type = %type_name);
            }
            DomainEvent::TaskCreated {
                task_id,
                task_type,
                priority,
                ..
            } => {
                tracing::info!(target: "docket::events", event = name, %task_id, %task_type, priority);
            }
            DomainEvent::TaskDeduplicated {
                task_id,
                task_type,
                dedup_key,
            } => {
                tracing::info!(target: "docket::events", event = name, %task_id, %task_type, %dedup_key);
            }
            DomainEvent::TaskClaimed {
                task_id,
                worker_id,
                attempts,
                ..
            } => {
                tracing::info!(target: "docket::events", event = name, %task_id, %worker_id, attempts);
            }
            DomainEvent::TaskReclaimed {
                task_id,
                worker_id,
                previous_worker,
                attempts,
                ..
            } => {
                tracing::warn!(
                    target: "docket::events",
                    event = name,
                    %task_id,
                    %worker_id,
                    previous_worker = previous_worker.as_deref().unwrap_or(""),
                    attempts,
                    "claim expired, task reclaimed"
                );
            }
            DomainEvent::TaskCompleted {
                task_id, worker_id, ..
            } => {
                tracing::info!(target: "docket::events", event = name, %task_id, %worker_id);
            }
            DomainEvent::TaskRetried {
                task_id,
                worker_id,
                attempts,
                max_attempts,
            } => {
                tracing::info!(target: "docket::events", event = name, %task_id, %worker_id, attempts, max_attempts);
            }
            DomainEvent::TaskFailed {
                task_id,
                worker_id,
                attempts,
                error,
            } => {
                tracing::warn!(
                    target: "docket::events",
                    event = name,
                    %task_id,
                    %worker_id,
                    attempts,
                    error = error.as_deref().unwrap_or(""),
                    "task failed permanently"
                );
            }
            DomainEvent::TaskProgress {
                task_id,
                worker_id,
                percent,
            } => {
                tracing::debug!(target: "docket::events", event = name, %task_id, %worker_id, percent);
            }
        }
    }
}

/// 何もしない
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: DomainEvent) {}
}

/// テスト用: イベントを順に保持する
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(DomainEvent::name).collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: DomainEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
