//! Event types published by the orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All possible events in the system
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    #[serde(rename = "session.created")]
    SessionCreated {
        session_id: Uuid,
        working_dir: String,
    },

    /// An operation finished successfully on one of the backends
    #[serde(rename = "operation.completed")]
    OperationCompleted {
        session_id: Uuid,
        operation: String,
        backend: String,
        attempts: u32,
        message: String,
    },

    #[serde(rename = "operation.failed")]
    OperationFailed {
        session_id: Uuid,
        operation: String,
        kind: String,
        message: String,
    },

    #[serde(rename = "phase.changed")]
    PhaseChanged {
        session_id: Uuid,
        from_phase: String,
        to_phase: String,
    },

    /// The primary backend could not carry out an operation and GUI
    /// automation took over
    #[serde(rename = "fallback.invoked")]
    FallbackInvoked {
        session_id: Uuid,
        operation: String,
        reason: String,
    },

    #[serde(rename = "session.degraded")]
    SessionDegraded { session_id: Uuid, reason: String },

    #[serde(rename = "simulation.finished")]
    SimulationFinished {
        session_id: Uuid,
        converged: bool,
        status_code: i32,
    },

    #[serde(rename = "session.closed")]
    SessionClosed { session_id: Uuid },

    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Event::SessionCreated { session_id, .. }
            | Event::OperationCompleted { session_id, .. }
            | Event::OperationFailed { session_id, .. }
            | Event::PhaseChanged { session_id, .. }
            | Event::FallbackInvoked { session_id, .. }
            | Event::SessionDegraded { session_id, .. }
            | Event::SimulationFinished { session_id, .. }
            | Event::SessionClosed { session_id } => Some(*session_id),
            Event::Error { .. } => None,
        }
    }

    /// The `type` tag this event serializes with.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::SessionCreated { .. } => "session.created",
            Event::OperationCompleted { .. } => "operation.completed",
            Event::OperationFailed { .. } => "operation.failed",
            Event::PhaseChanged { .. } => "phase.changed",
            Event::FallbackInvoked { .. } => "fallback.invoked",
            Event::SessionDegraded { .. } => "session.degraded",
            Event::SimulationFinished { .. } => "simulation.finished",
            Event::SessionClosed { .. } => "session.closed",
            Event::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope_creation() {
        let envelope = EventEnvelope::new(Event::SessionClosed {
            session_id: Uuid::new_v4(),
        });

        assert!(!envelope.id.is_nil());
        assert!(envelope.timestamp <= Utc::now());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::PhaseChanged {
            session_id: Uuid::new_v4(),
            from_phase: "composition_set".to_string(),
            to_phase: "flashed".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("phase.changed"));
        assert!(json.contains("from_phase"));
        assert!(json.contains("\"to_phase\":\"flashed\""));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"simulation.finished","session_id":"550e8400-e29b-41d4-a716-446655440000","converged":false,"status_code":0}"#;
        let event: Event = serde_json::from_str(json).unwrap();

        match event {
            Event::SimulationFinished {
                converged,
                status_code,
                ..
            } => {
                assert!(!converged);
                assert_eq!(status_code, 0);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_session_id() {
        let session_id = Uuid::new_v4();
        let event = Event::FallbackInvoked {
            session_id,
            operation: "create_block".to_string(),
            reason: "unsupported".to_string(),
        };
        assert_eq!(event.session_id(), Some(session_id));
        assert_eq!(event.event_type(), "fallback.invoked");

        let error_event = Event::Error {
            message: "test".to_string(),
            context: None,
        };
        assert_eq!(error_event.session_id(), None);
    }
}
