use crate::routes::sse::{EventBuffer, SharedEventBuffer, DEFAULT_EVENT_BUFFER_SIZE};
use events::EventBus;
use orchestrator::SessionManager;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub event_bus: EventBus,
    pub event_buffer: SharedEventBuffer,
}

impl AppState {
    /// Shares the manager's event bus so SSE subscribers see every
    /// orchestrator event.
    pub fn new(manager: SessionManager) -> Self {
        let event_bus = manager.event_bus().clone();
        let event_buffer = Arc::new(RwLock::new(EventBuffer::new(DEFAULT_EVENT_BUFFER_SIZE)));

        Self {
            manager: Arc::new(manager),
            event_bus,
            event_buffer,
        }
    }
}
