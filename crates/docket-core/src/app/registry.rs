//! Task Type Registry.

use tracing::Instrument;

use super::context::ServiceContext;
use super::retry::retry_on_conflict;
use crate::domain::{BrokerError, DomainEvent, TaskType, TypeRegistration};

#[derive(Clone)]
pub struct TaskTypeRegistry {
    ctx: ServiceContext,
}

impl TaskTypeRegistry {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Insert-or-update by name. An existing type keeps its id, takes the new
    /// version/schema and is reactivated.
    pub async fn register(&self, registration: TypeRegistration) -> Result<TaskType, BrokerError> {
        registration.validate()?;
        let span = tracing::info_span!("register_type", task_type = %registration.name);

        async {
            let ctx = &self.ctx;
            let registration = &registration;
            let task_type = retry_on_conflict(&ctx.config.conflict_retry, "register_type", move || {
                let candidate =
                    TaskType::new(ctx.ids.task_type_id(), registration.clone(), ctx.clock.now());
                async move { Ok(ctx.store.upsert_task_type(candidate).await?) }
            })
            .await?;

            tracing::debug!(task_type_id = %task_type.id, version = %task_type.version, "type registered");
            self.ctx.emit(DomainEvent::TypeRegistered {
                task_type_id: task_type.id,
                name: task_type.name.clone(),
                version: task_type.version.clone(),
                active: task_type.active,
            });
            Ok(task_type)
        }
        .instrument(span)
        .await
    }

    pub async fn get(&self, name: &str) -> Result<TaskType, BrokerError> {
        self.ctx
            .store
            .task_type_by_name(name)
            .await?
            .ok_or_else(|| BrokerError::TypeNotFound(name.to_string()))
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<TaskType>, BrokerError> {
        Ok(self.ctx.store.list_task_types(active_only).await?)
    }

    /// Flips `active` off. Existing tasks stay claimable; new ones are refused.
    pub async fn deactivate(&self, name: &str) -> Result<TaskType, BrokerError> {
        let now = self.ctx.clock.now();
        let task_type = self
            .ctx
            .store
            .set_task_type_active(name, false, now)
            .await?
            .ok_or_else(|| BrokerError::TypeNotFound(name.to_string()))?;

        self.ctx.emit(DomainEvent::TypeDeactivated {
            task_type_id: task_type.id,
            name: task_type.name.clone(),
        });
        Ok(task_type)
    }
}
