//! RAII guard for one dispatched operation.
//!
//! A dispatch future can be dropped mid-flight (the HTTP client went away,
//! the caller timed out). The guard makes sure subscribers still hear that
//! the operation did not complete.

use tracing::{debug, warn};
use uuid::Uuid;

use events::{Event, EventBus};

use crate::error::OrchestratorError;

/// Emits `operation.failed` on drop unless marked completed or failed.
///
/// ```ignore
/// let mut guard = OperationGuard::new(session_id, "flash_stream", bus);
/// match run().await {
///     Ok(_) => guard.mark_completed(),
///     Err(e) => guard.mark_failed(&e),
/// }
/// ```
pub struct OperationGuard {
    session_id: Uuid,
    operation: String,
    event_bus: Option<EventBus>,
    completed: bool,
}

impl OperationGuard {
    pub fn new(session_id: Uuid, operation: impl Into<String>, event_bus: Option<EventBus>) -> Self {
        let operation = operation.into();
        debug!(
            session_id = %session_id,
            operation = %operation,
            "Operation guard created"
        );

        Self {
            session_id,
            operation,
            event_bus,
            completed: false,
        }
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    /// Emit the failure now and disarm the drop handler.
    pub fn mark_failed(&mut self, error: &OrchestratorError) {
        debug!(
            session_id = %self.session_id,
            operation = %self.operation,
            error = %error,
            "Operation marked as failed"
        );
        self.emit_failure(error.kind(), error.to_string());
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    fn emit_failure(&self, kind: &str, message: String) {
        if let Some(ref bus) = self.event_bus {
            bus.emit(Event::OperationFailed {
                session_id: self.session_id,
                operation: self.operation.clone(),
                kind: kind.to_string(),
                message,
            });
        }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if !self.completed {
            warn!(
                session_id = %self.session_id,
                operation = %self.operation,
                "Operation guard dropped without completion - emitting failure"
            );
            self.emit_failure("aborted", "operation was dropped before it finished".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_initial_state() {
        let guard = OperationGuard::new(Uuid::new_v4(), "flash_stream", None);
        assert!(!guard.is_completed());
        assert_eq!(guard.operation(), "flash_stream");
    }

    #[tokio::test]
    async fn test_drop_without_completion_emits_failure() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let session_id = Uuid::new_v4();

        drop(OperationGuard::new(session_id, "run_simulation", Some(bus.clone())));

        let envelope = rx.recv().await.unwrap();
        match envelope.event {
            Event::OperationFailed {
                session_id: id,
                operation,
                kind,
                ..
            } => {
                assert_eq!(id, session_id);
                assert_eq!(operation, "run_simulation");
                assert_eq!(kind, "aborted");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_completed_guard_is_silent() {
        let bus = EventBus::new();
        let mut guard = OperationGuard::new(Uuid::new_v4(), "save_project", Some(bus.clone()));
        guard.mark_completed();
        drop(guard);

        assert_eq!(bus.event_count(), 0);
    }

    #[tokio::test]
    async fn test_mark_failed_emits_once() {
        let bus = EventBus::new();
        let _rx = bus.subscribe();
        let mut guard = OperationGuard::new(Uuid::new_v4(), "create_block", Some(bus.clone()));
        guard.mark_failed(&OrchestratorError::UnknownBlock("X".to_string()));
        drop(guard);

        assert_eq!(bus.event_count(), 1);
    }
}
