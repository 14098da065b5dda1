use procflow_core::WorkflowPhase;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Cannot run {operation} in phase {phase}: {reason}")]
    Sequence {
        operation: String,
        phase: WorkflowPhase,
        /// Operation the caller has to run first.
        missing: Option<String>,
        reason: String,
    },

    #[error("Invalid composition (sum {sum:.4}, expected {expected}): {reason}")]
    CompositionInvalid {
        sum: f64,
        expected: f64,
        reason: String,
    },

    #[error("Property out of range: {field} = {value}")]
    PropertyOutOfRange { field: String, value: f64 },

    #[error("Illegal connection to block {block} port {port}: {reason}")]
    IllegalConnection {
        block: String,
        port: u32,
        reason: String,
    },

    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    #[error("Unknown block: {0}")]
    UnknownBlock(String),

    #[error("Name already in use: {0}")]
    DuplicateName(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Engine error in {operation} after {attempts} attempts: {message}")]
    RecoverableEngine {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("Operation {operation} is not supported by the engine interface: {message}")]
    UnsupportedOperation { operation: String, message: String },

    #[error("GUI fallback for {operation} exhausted at step {step} after {attempts} attempts")]
    FallbackExhausted {
        operation: String,
        step: usize,
        attempts: u32,
    },

    #[error("Engine unresponsive during {operation} (timeout {timeout_ms}ms)")]
    EngineUnresponsive { operation: String, timeout_ms: u64 },

    #[error("Engine rejected {operation} (code {code}): {message}")]
    EngineRejected {
        operation: String,
        code: i32,
        message: String,
    },

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Session {0} is busy with another operation")]
    SessionBusy(Uuid),

    #[error("Session {0} is degraded; reset it before issuing more operations")]
    SessionDegraded(Uuid),

    #[error("Operation {operation} was cancelled")]
    Cancelled { operation: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Bridge error: {0}")]
    Bridge(String),
}

impl OrchestratorError {
    pub fn sequence(
        operation: impl Into<String>,
        phase: WorkflowPhase,
        missing: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Sequence {
            operation: operation.into(),
            phase,
            missing: missing.map(str::to_string),
            reason: reason.into(),
        }
    }

    pub fn composition(sum: f64, reason: impl Into<String>) -> Self {
        Self::CompositionInvalid {
            sum,
            expected: 1.0,
            reason: reason.into(),
        }
    }

    pub fn out_of_range(field: impl Into<String>, value: f64) -> Self {
        Self::PropertyOutOfRange {
            field: field.into(),
            value,
        }
    }

    pub fn illegal_connection(block: impl Into<String>, port: u32, reason: impl Into<String>) -> Self {
        Self::IllegalConnection {
            block: block.into(),
            port,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sequence { .. } => "sequence_error",
            Self::CompositionInvalid { .. } => "composition_invalid",
            Self::PropertyOutOfRange { .. } => "property_out_of_range",
            Self::IllegalConnection { .. } => "illegal_connection",
            Self::UnknownStream(_) => "unknown_stream",
            Self::UnknownBlock(_) => "unknown_block",
            Self::DuplicateName(_) => "duplicate_name",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RecoverableEngine { .. } => "recoverable_engine_error",
            Self::UnsupportedOperation { .. } => "unsupported_operation",
            Self::FallbackExhausted { .. } => "fallback_exhausted",
            Self::EngineUnresponsive { .. } => "engine_unresponsive",
            Self::EngineRejected { .. } => "engine_rejected",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SessionBusy(_) => "session_busy",
            Self::SessionDegraded(_) => "session_degraded",
            Self::Cancelled { .. } => "cancelled",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Bridge(_) => "bridge_error",
        }
    }

    /// Validation failures are raised before any engine contact.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::CompositionInvalid { .. }
                | Self::PropertyOutOfRange { .. }
                | Self::IllegalConnection { .. }
                | Self::UnknownStream(_)
                | Self::UnknownBlock(_)
                | Self::DuplicateName(_)
                | Self::InvalidRequest(_)
        )
    }

    /// Corrective hint for the caller, where one applies.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Sequence {
                missing: Some(missing),
                ..
            } => Some(format!("Run {} first", missing)),
            Self::Sequence { .. } => None,
            Self::CompositionInvalid { sum, expected, .. } if (sum - expected).abs() > 1e-3 => {
                Some(if sum < expected {
                    format!("Composition summed to {:.3}; did you omit a component?", sum)
                } else {
                    format!("Composition summed to {:.3}; check for a double-counted component", sum)
                })
            }
            Self::CompositionInvalid { .. } => {
                Some("Use species registered with add_components, one fraction each".to_string())
            }
            Self::PropertyOutOfRange { field, .. } => Some(match field.as_str() {
                "temperature_c" => "Temperature must lie between -273.15 and 1000 °C".to_string(),
                "pressure_kpa" => "Pressure is absolute and must be greater than zero".to_string(),
                _ => format!("{} must be zero or positive", field),
            }),
            Self::IllegalConnection { .. } => {
                Some("Check the block's port layout and the stream direction".to_string())
            }
            Self::UnknownStream(_) => Some("Create the stream with create_stream".to_string()),
            Self::UnknownBlock(_) => Some("Create the block with create_block".to_string()),
            Self::DuplicateName(_) => Some("Pick a unique block or stream name".to_string()),
            Self::RecoverableEngine { .. } => {
                Some("Retry the operation once the engine is idle".to_string())
            }
            Self::UnsupportedOperation { operation, .. } => Some(format!(
                "Add a GUI automation playbook for {} to the configuration",
                operation
            )),
            Self::FallbackExhausted { .. } => {
                Some("Check the engine window layout and the playbook regions".to_string())
            }
            Self::EngineUnresponsive { .. } | Self::SessionDegraded(_) => {
                Some("Reconnect to the engine, then reset the session".to_string())
            }
            Self::SessionBusy(_) => Some("Wait for the running operation to finish".to_string()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
