//! Shared handles injected into every service.

use std::sync::Arc;

use crate::config::BrokerConfig;
use crate::domain::{Decider, DomainEvent};
use crate::ports::{Clock, EventSink, IdGenerator, TaskStore};

/// Collaborators of a service. Cloning is cheap (`Arc`s + a small config).
#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn TaskStore>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub events: Arc<dyn EventSink>,
    pub decider: Arc<dyn Decider>,
    pub config: BrokerConfig,
}

impl ServiceContext {
    pub(crate) fn emit(&self, event: DomainEvent) {
        self.events.emit(event);
    }
}
