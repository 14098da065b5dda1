use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Construction phase of one flowsheet session.
///
/// Variants are declared in workflow order, so `Ord` follows the order in
/// which a flowsheet is built: comparing two phases tells whether one is
/// a prerequisite of the other.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    #[default]
    Uninitialized,
    ProjectCreated,
    FlowsheetCreated,
    ComponentsConfigured,
    TopologyBuilt,
    PropertiesSet,
    CompositionSet,
    Flashed,
    Solved,
    ResultsRetrieved,
}

impl WorkflowPhase {
    pub const ALL: [WorkflowPhase; 10] = [
        Self::Uninitialized,
        Self::ProjectCreated,
        Self::FlowsheetCreated,
        Self::ComponentsConfigured,
        Self::TopologyBuilt,
        Self::PropertiesSet,
        Self::CompositionSet,
        Self::Flashed,
        Self::Solved,
        Self::ResultsRetrieved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::ProjectCreated => "project_created",
            Self::FlowsheetCreated => "flowsheet_created",
            Self::ComponentsConfigured => "components_configured",
            Self::TopologyBuilt => "topology_built",
            Self::PropertiesSet => "properties_set",
            Self::CompositionSet => "composition_set",
            Self::Flashed => "flashed",
            Self::Solved => "solved",
            Self::ResultsRetrieved => "results_retrieved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|phase| phase.as_str() == s)
    }

    pub fn next(&self) -> Option<Self> {
        let idx = Self::ALL.iter().position(|p| p == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Phases from which results can be read.
    pub fn is_solved(&self) -> bool {
        *self >= Self::Solved
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
