use docket_core::Broker;

/// Shared handler state. The broker itself is stateless between requests.
#[derive(Clone)]
pub struct AppState {
    pub broker: Broker,
}

impl AppState {
    pub fn new(broker: Broker) -> Self {
        Self { broker }
    }
}
