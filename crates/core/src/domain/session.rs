use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::block::Block;
use super::phase::WorkflowPhase;
use super::results::{SimulationOutcome, StreamResults};
use super::species::ComponentSet;
use super::stream::Stream;

/// Execution path that carried out an operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Primary,
    Fallback,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

/// One entry of a session's operation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct OperationRecord {
    pub seq: u64,
    pub operation: String,
    pub backend: Backend,
    pub attempts: u32,
    pub phase_before: WorkflowPhase,
    pub phase_after: WorkflowPhase,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// One flowsheet construction context and everything known about the
/// engine state behind it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub id: Uuid,
    pub phase: WorkflowPhase,
    #[schema(value_type = String)]
    pub working_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flowsheet: Option<String>,
    pub components: ComponentSet,
    pub blocks: Vec<Block>,
    pub streams: Vec<Stream>,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub project_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<SimulationOutcome>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, StreamResults>,
    #[serde(skip)]
    pub log: Vec<OperationRecord>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: WorkflowPhase::Uninitialized,
            working_dir: working_dir.into(),
            flowsheet: None,
            components: ComponentSet::new(),
            blocks: Vec::new(),
            streams: Vec::new(),
            degraded: false,
            project_path: None,
            last_outcome: None,
            results: BTreeMap::new(),
            log: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn stream(&self, name: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.name == name)
    }

    pub fn stream_mut(&mut self, name: &str) -> Option<&mut Stream> {
        self.streams.iter_mut().find(|s| s.name == name)
    }

    /// Blocks and streams share one namespace on the engine's drawing page.
    pub fn name_taken(&self, name: &str) -> bool {
        self.block(name).is_some() || self.stream(name).is_some()
    }

    /// Streams feeding any block.
    pub fn inlet_streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter().filter(|s| s.downstream.is_some())
    }

    /// Deterministic project file name: `<id>_<YYYYmmdd_HHMMSS>.pmx`.
    pub fn default_project_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.working_dir
            .join(format!("{}_{}.pmx", self.id, now.format("%Y%m%d_%H%M%S")))
    }

    pub fn record(
        &mut self,
        operation: impl Into<String>,
        backend: Backend,
        attempts: u32,
        phase_before: WorkflowPhase,
        message: impl Into<String>,
    ) -> &OperationRecord {
        let seq = self.log.len() as u64 + 1;
        self.log.push(OperationRecord {
            seq,
            operation: operation.into(),
            backend,
            attempts,
            phase_before,
            phase_after: self.phase,
            timestamp: Utc::now(),
            message: message.into(),
        });
        &self.log[self.log.len() - 1]
    }

    /// Tear down everything the engine project held. The log is kept.
    pub fn clear_flowsheet(&mut self) {
        self.phase = WorkflowPhase::Uninitialized;
        self.flowsheet = None;
        self.components = ComponentSet::new();
        self.blocks.clear();
        self.streams.clear();
        self.last_outcome = None;
        self.results.clear();
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}
