//! Command interface to the simulation engine.
//!
//! [`EngineBackend`] is the narrow numeric contract the engine exposes;
//! [`PrimaryAdapter`] translates domain operations onto it.

mod adapter;
mod bridge;
mod simulated;

use std::path::Path;

use async_trait::async_trait;
use procflow_core::{PortRole, StencilRef, StreamEnd};
use serde::{Deserialize, Serialize};

pub use adapter::{AdapterError, PrimaryAdapter, Reply};
pub use bridge::BridgeEngine;
pub use simulated::{SimulatedEngine, STREAM_MASTER};

/// Phase index of a stream's total (all phases combined) properties.
pub const TOTAL_PHASE: i32 = 5;
/// Composition basis index for mole fractions.
pub const MOLAR_FRACTION_BASIS: i32 = 6;

/// Solver status codes at or above this value mean converged.
pub fn is_converged(status: i32) -> bool {
    status >= 1
}

/// Phase property indices understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseProp {
    Temperature,
    Pressure,
    MolarFlow,
    MassFlow,
}

impl PhaseProp {
    pub fn index(&self) -> i32 {
        match self {
            Self::Temperature => 0,
            Self::Pressure => 1,
            Self::MolarFlow => 16,
            Self::MassFlow => 17,
        }
    }

    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Self::Temperature),
            1 => Some(Self::Pressure),
            16 => Some(Self::MolarFlow),
            17 => Some(Self::MassFlow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    /// Busy or briefly unavailable; worth retrying.
    Transient,
    /// The command interface cannot express this request.
    Unsupported,
    /// The engine refused the request; retrying will not help.
    Rejected,
    /// The connection to the engine is gone.
    Disconnected,
}

impl FaultClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Unsupported => "unsupported",
            Self::Rejected => "rejected",
            Self::Disconnected => "disconnected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transient" => Some(Self::Transient),
            "unsupported" => Some(Self::Unsupported),
            "rejected" => Some(Self::Rejected),
            "disconnected" => Some(Self::Disconnected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{} fault {code}: {message}", class.as_str())]
pub struct EngineFault {
    pub class: FaultClass,
    pub code: i32,
    pub message: String,
}

impl EngineFault {
    pub fn new(class: FaultClass, code: i32, message: impl Into<String>) -> Self {
        Self {
            class,
            code,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FaultClass::Transient, 0, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FaultClass::Unsupported, 0, message)
    }

    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        Self::new(FaultClass::Rejected, code, message)
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(FaultClass::Disconnected, 0, message)
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineFault>;

/// Total-phase values of one stream as the engine reports them, in SI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamReadout {
    pub temperature_k: Option<f64>,
    pub pressure_pa: Option<f64>,
    pub molar_flow_mol_s: Option<f64>,
    pub mass_flow_kg_s: Option<f64>,
    pub vapor_fraction: Option<f64>,
    /// Aligned with the engine environment's component order.
    #[serde(default)]
    pub mole_fractions: Vec<f64>,
}

/// The engine's command interface. One instance serves one session.
#[async_trait]
pub trait EngineBackend: Send + Sync {
    async fn new_project(&self) -> EngineResult<()>;
    async fn add_flowsheet(&self, name: &str) -> EngineResult<String>;
    async fn add_component(&self, name: &str) -> EngineResult<()>;
    /// Registered components in environment order.
    async fn environment_components(&self) -> EngineResult<Vec<String>>;
    /// Drop a block shape; returns the engine's identifier for it.
    async fn add_block(&self, stencil: StencilRef, name: &str) -> EngineResult<String>;
    async fn add_stream(&self, name: &str) -> EngineResult<String>;
    /// Glue one end of a stream to a numbered block port.
    async fn glue(
        &self,
        stream_id: &str,
        end: StreamEnd,
        block_id: &str,
        role: PortRole,
        port: u32,
    ) -> EngineResult<()>;
    async fn set_phase_property(
        &self,
        stream_id: &str,
        phase: i32,
        property: PhaseProp,
        value: f64,
    ) -> EngineResult<()>;
    /// Write every component's value in one call.
    async fn set_composition(
        &self,
        stream_id: &str,
        phase: i32,
        basis: i32,
        values: &[f64],
    ) -> EngineResult<()>;
    async fn flash(&self, stream_id: &str) -> EngineResult<()>;
    /// Returns the solver status code.
    async fn solve(&self) -> EngineResult<i32>;
    async fn read_stream(&self, stream_id: &str) -> EngineResult<StreamReadout>;
    async fn list_streams(&self) -> EngineResult<Vec<String>>;
    async fn save_as(&self, path: &Path) -> EngineResult<()>;
    async fn close(&self) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_indices() {
        assert_eq!(PhaseProp::Temperature.index(), 0);
        assert_eq!(PhaseProp::Pressure.index(), 1);
        assert_eq!(PhaseProp::MolarFlow.index(), 16);
        assert_eq!(PhaseProp::MassFlow.index(), 17);
        assert_eq!(PhaseProp::from_index(17), Some(PhaseProp::MassFlow));
    }

    #[test]
    fn test_convergence_threshold() {
        assert!(!is_converged(0));
        assert!(!is_converged(-1));
        assert!(is_converged(1));
        assert!(is_converged(2));
    }

    #[test]
    fn test_fault_display() {
        let fault = EngineFault::rejected(404, "species not found");
        assert_eq!(fault.to_string(), "rejected fault 404: species not found");
    }
}
