use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    AmineTreater,
    StagedColumn,
    Separator,
    HeatExchanger,
    Compressor,
    Pump,
    Valve,
    Mixer,
    Splitter,
}

/// Engine shape library entry used to place a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilRef {
    pub stencil: &'static str,
    pub master: &'static str,
}

impl BlockKind {
    pub const ALL: [BlockKind; 9] = [
        Self::AmineTreater,
        Self::StagedColumn,
        Self::Separator,
        Self::HeatExchanger,
        Self::Compressor,
        Self::Pump,
        Self::Valve,
        Self::Mixer,
        Self::Splitter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmineTreater => "amine_treater",
            Self::StagedColumn => "staged_column",
            Self::Separator => "separator",
            Self::HeatExchanger => "heat_exchanger",
            Self::Compressor => "compressor",
            Self::Pump => "pump",
            Self::Valve => "valve",
            Self::Mixer => "mixer",
            Self::Splitter => "splitter",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::InvalidBlockKind(s.to_string()))
    }

    pub fn stencil(&self) -> StencilRef {
        let (stencil, master) = match self {
            Self::AmineTreater | Self::StagedColumn => ("Column.vss", "Distill"),
            Self::Separator => ("Separators.vss", "2 Phase Separator"),
            Self::HeatExchanger => ("Exchangers.vss", "Shell and Tube Exchanger"),
            Self::Compressor => ("Fluid Drivers.vss", "Compressor"),
            Self::Pump => ("Fluid Drivers.vss", "Pump"),
            Self::Valve => ("Valves.vss", "JT Valve"),
            Self::Mixer => ("Mixer Splitters.vss", "Mixer"),
            Self::Splitter => ("Mixer Splitters.vss", "Splitter"),
        };
        StencilRef { stencil, master }
    }

    /// Number of (inlet, outlet) connection points.
    pub fn port_layout(&self) -> (u32, u32) {
        match self {
            // lean solvent top, sour gas bottom / treated gas overhead, rich solvent bottoms
            Self::AmineTreater => (2, 2),
            Self::StagedColumn => (3, 2),
            Self::Separator => (1, 2),
            Self::HeatExchanger => (2, 2),
            Self::Compressor | Self::Pump | Self::Valve => (1, 1),
            Self::Mixer => (3, 1),
            Self::Splitter => (1, 2),
        }
    }

    pub fn connection_points(&self) -> Vec<ConnectionPoint> {
        let (inlets, outlets) = self.port_layout();
        (1..=inlets)
            .map(|index| ConnectionPoint {
                index,
                role: PortRole::Inlet,
            })
            .chain((1..=outlets).map(|index| ConnectionPoint {
                index,
                role: PortRole::Outlet,
            }))
            .collect()
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PortRole {
    Inlet,
    Outlet,
}

impl PortRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inlet => "inlet",
            Self::Outlet => "outlet",
        }
    }
}

/// A numbered port on a block; indices are 1-based within each role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
pub struct ConnectionPoint {
    pub index: u32,
    pub role: PortRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Block {
    pub name: String,
    pub kind: BlockKind,
    /// Identifier assigned by the engine; may differ from `name`.
    pub engine_id: String,
    pub connection_points: Vec<ConnectionPoint>,
}

impl Block {
    pub fn new(name: impl Into<String>, kind: BlockKind, engine_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            engine_id: engine_id.into(),
            connection_points: kind.connection_points(),
        }
    }

    pub fn port(&self, role: PortRole, index: u32) -> Option<&ConnectionPoint> {
        self.connection_points
            .iter()
            .find(|p| p.role == role && p.index == index)
    }

    pub fn port_count(&self, role: PortRole) -> usize {
        self.connection_points
            .iter()
            .filter(|p| p.role == role)
            .count()
    }
}
