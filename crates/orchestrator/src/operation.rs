use std::collections::BTreeMap;
use std::path::PathBuf;

use procflow_core::{
    Backend, BlockKind, Composition, CompositionInput, PhaseProperties, ResultField,
    SimulationOutcome, StreamConditions, StreamDirection, StreamEnd, StreamResults,
    WorkflowPhase,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Species names as a list or as one comma-separated string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum SpeciesList {
    List(Vec<String>),
    Csv(String),
}

impl SpeciesList {
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::List(names) => names.iter().map(|n| n.trim().to_string()).collect::<Vec<_>>(),
            Self::Csv(csv) => csv.split(',').map(|n| n.trim().to_string()).collect(),
        }
        .into_iter()
        .filter(|n| !n.is_empty())
        .collect()
    }
}

/// A domain operation requested by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateProject,
    AddFlowsheet {
        name: String,
    },
    AddComponents {
        components: SpeciesList,
    },
    CreateBlock {
        kind: BlockKind,
        name: String,
    },
    CreateStream {
        name: String,
    },
    ConnectStream {
        stream: String,
        block: String,
        direction: StreamDirection,
        /// 1-based within the direction's role.
        port: u32,
    },
    SetStreamProperties {
        stream: String,
        #[serde(default)]
        temperature_c: Option<f64>,
        #[serde(default)]
        pressure_kpa: Option<f64>,
        #[serde(default)]
        molar_flow_kmol_h: Option<f64>,
        #[serde(default)]
        mass_flow_kg_h: Option<f64>,
    },
    SetStreamComposition {
        stream: String,
        composition: CompositionInput,
    },
    FlashStream {
        stream: String,
    },
    RunSimulation,
    GetResults {
        /// Every stream when empty.
        #[serde(default)]
        streams: Vec<String>,
        /// Every property when empty.
        #[serde(default)]
        properties: Vec<ResultField>,
    },
    /// Re-open a solved flowsheet for new stream conditions.
    AdjustParameters {
        stream: String,
        #[serde(default)]
        temperature_c: Option<f64>,
        #[serde(default)]
        pressure_kpa: Option<f64>,
        #[serde(default)]
        molar_flow_kmol_h: Option<f64>,
        #[serde(default)]
        mass_flow_kg_h: Option<f64>,
    },
    SaveProject {
        #[serde(default)]
        #[schema(value_type = Option<String>)]
        path: Option<PathBuf>,
    },
    ListComponents,
    ListStreams,
    CloseProject,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateProject => "create_project",
            Self::AddFlowsheet { .. } => "add_flowsheet",
            Self::AddComponents { .. } => "add_components",
            Self::CreateBlock { .. } => "create_block",
            Self::CreateStream { .. } => "create_stream",
            Self::ConnectStream { .. } => "connect_stream",
            Self::SetStreamProperties { .. } => "set_stream_properties",
            Self::SetStreamComposition { .. } => "set_stream_composition",
            Self::FlashStream { .. } => "flash_stream",
            Self::RunSimulation => "run_simulation",
            Self::GetResults { .. } => "get_results",
            Self::AdjustParameters { .. } => "adjust_parameters",
            Self::SaveProject { .. } => "save_project",
            Self::ListComponents => "list_components",
            Self::ListStreams => "list_streams",
            Self::CloseProject => "close_project",
        }
    }

    /// Stream conditions carried by property-writing operations.
    pub fn conditions(&self) -> Option<StreamConditions> {
        match self {
            Self::SetStreamProperties {
                temperature_c,
                pressure_kpa,
                molar_flow_kmol_h,
                mass_flow_kg_h,
                ..
            }
            | Self::AdjustParameters {
                temperature_c,
                pressure_kpa,
                molar_flow_kmol_h,
                mass_flow_kg_h,
                ..
            } => Some(StreamConditions {
                temperature_c: *temperature_c,
                pressure_kpa: *pressure_kpa,
                molar_flow_kmol_h: *molar_flow_kmol_h,
                mass_flow_kg_h: *mass_flow_kg_h,
            }),
            _ => None,
        }
    }

    pub fn set_properties(stream: impl Into<String>, conditions: StreamConditions) -> Self {
        Self::SetStreamProperties {
            stream: stream.into(),
            temperature_c: conditions.temperature_c,
            pressure_kpa: conditions.pressure_kpa,
            molar_flow_kmol_h: conditions.molar_flow_kmol_h,
            mass_flow_kg_h: conditions.mass_flow_kg_h,
        }
    }

    pub fn adjust(stream: impl Into<String>, conditions: StreamConditions) -> Self {
        Self::AdjustParameters {
            stream: stream.into(),
            temperature_c: conditions.temperature_c,
            pressure_kpa: conditions.pressure_kpa,
            molar_flow_kmol_h: conditions.molar_flow_kmol_h,
            mass_flow_kg_h: conditions.mass_flow_kg_h,
        }
    }

    pub fn connect(
        stream: impl Into<String>,
        block: impl Into<String>,
        direction: StreamDirection,
        port: u32,
    ) -> Self {
        Self::ConnectStream {
            stream: stream.into(),
            block: block.into(),
            direction,
            port,
        }
    }
}

/// An operation after it passed sequencing and validation, with names
/// resolved to engine identifiers and inputs normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedOperation {
    CreateProject,
    AddFlowsheet {
        name: String,
    },
    AddComponents {
        requested: Vec<String>,
        failed: Vec<FailedComponent>,
        warnings: Vec<String>,
    },
    CreateBlock {
        name: String,
        kind: BlockKind,
    },
    CreateStream {
        name: String,
    },
    ConnectStream {
        stream: String,
        stream_id: String,
        block: String,
        block_id: String,
        direction: StreamDirection,
        port: u32,
    },
    SetStreamProperties {
        stream: String,
        stream_id: String,
        conditions: StreamConditions,
    },
    SetStreamComposition {
        stream: String,
        stream_id: String,
        composition: Composition,
    },
    FlashStream {
        stream: String,
        stream_id: String,
    },
    RunSimulation,
    GetResults {
        streams: Vec<(String, String)>,
        fields: Vec<ResultField>,
    },
    AdjustParameters {
        stream: String,
        stream_id: String,
        conditions: StreamConditions,
    },
    SaveProject {
        path: PathBuf,
    },
    ListComponents,
    ListStreams,
    CloseProject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FailedComponent {
    pub name: String,
    pub reason: String,
}

/// What an operation produced. Committing it updates the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OperationOutput {
    ProjectCreated {
        session_id: Uuid,
    },
    FlowsheetCreated {
        name: String,
        flowsheet_id: String,
    },
    ComponentsAdded {
        added: Vec<String>,
        failed: Vec<FailedComponent>,
        /// Every species in the engine environment, in engine order.
        #[serde(default)]
        registered: Vec<String>,
    },
    BlockCreated {
        name: String,
        kind: BlockKind,
        engine_id: String,
    },
    StreamCreated {
        name: String,
        stream_id: String,
    },
    StreamConnected {
        stream: String,
        block: String,
        port: u32,
        end: StreamEnd,
    },
    PropertiesSet {
        stream: String,
        properties: PhaseProperties,
    },
    CompositionSet {
        stream: String,
        composition: Composition,
        fractions: BTreeMap<String, f64>,
        sum: f64,
    },
    StreamFlashed {
        stream: String,
        properties: PhaseProperties,
    },
    Simulation {
        outcome: SimulationOutcome,
    },
    Results {
        streams: Vec<StreamResults>,
    },
    ParametersAdjusted {
        stream: String,
        properties: PhaseProperties,
    },
    ProjectSaved {
        #[schema(value_type = String)]
        path: PathBuf,
    },
    Components {
        components: Vec<String>,
    },
    Streams {
        streams: Vec<String>,
    },
    ProjectClosed,
}

/// Result of one dispatched operation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OperationResponse {
    pub operation: String,
    pub backend: Backend,
    pub attempts: u32,
    pub phase: WorkflowPhase,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub output: OperationOutput,
}
