//! Operation table: preconditions, resulting phase and fallback eligibility
//! of every operation, validated once at startup.

use std::collections::HashMap;

use procflow_core::WorkflowPhase;

use crate::error::{OrchestratorError, Result};

/// Every operation the dispatcher understands.
pub const OPERATION_NAMES: [&str; 16] = [
    "create_project",
    "add_flowsheet",
    "add_components",
    "create_block",
    "create_stream",
    "connect_stream",
    "set_stream_properties",
    "set_stream_composition",
    "flash_stream",
    "run_simulation",
    "get_results",
    "adjust_parameters",
    "save_project",
    "list_components",
    "list_streams",
    "close_project",
];

#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    pub name: &'static str,
    pub min: WorkflowPhase,
    pub max: WorkflowPhase,
    pub resulting: Option<WorkflowPhase>,
    /// Lands exactly on `resulting` even when that is behind the current phase.
    pub back_edge: bool,
    /// May be retried through GUI automation when a playbook exists.
    pub fallback_eligible: bool,
}

impl OperationSpec {
    pub fn new(name: &'static str, min: WorkflowPhase) -> Self {
        Self {
            name,
            min,
            max: WorkflowPhase::ResultsRetrieved,
            resulting: None,
            back_edge: false,
            fallback_eligible: false,
        }
    }

    pub fn up_to(mut self, max: WorkflowPhase) -> Self {
        self.max = max;
        self
    }

    pub fn exactly(mut self) -> Self {
        self.max = self.min;
        self
    }

    pub fn resulting(mut self, phase: WorkflowPhase) -> Self {
        self.resulting = Some(phase);
        self
    }

    pub fn back_edge_to(mut self, phase: WorkflowPhase) -> Self {
        self.resulting = Some(phase);
        self.back_edge = true;
        self
    }

    pub fn with_fallback(mut self) -> Self {
        self.fallback_eligible = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct OperationRegistry {
    specs: HashMap<&'static str, OperationSpec>,
}

impl OperationRegistry {
    pub fn new(specs: Vec<OperationSpec>) -> Result<Self> {
        let mut table = HashMap::new();
        for spec in specs {
            if !OPERATION_NAMES.contains(&spec.name) {
                return Err(OrchestratorError::Config(format!(
                    "unknown operation in registry: {}",
                    spec.name
                )));
            }
            if spec.min > spec.max {
                return Err(OrchestratorError::Config(format!(
                    "operation {} has minimum phase {} after maximum {}",
                    spec.name, spec.min, spec.max
                )));
            }
            if let Some(previous) = table.insert(spec.name, spec) {
                return Err(OrchestratorError::Config(format!(
                    "operation {} registered twice",
                    previous.name
                )));
            }
        }

        let missing: Vec<&str> = OPERATION_NAMES
            .iter()
            .copied()
            .filter(|name| !table.contains_key(name))
            .collect();
        if !missing.is_empty() {
            return Err(OrchestratorError::Config(format!(
                "operations missing from registry: {}",
                missing.join(", ")
            )));
        }

        Ok(Self { specs: table })
    }

    pub fn standard() -> Self {
        Self {
            specs: standard_specs().into_iter().map(|s| (s.name, s)).collect(),
        }
    }

    pub fn get(&self, operation: &str) -> Option<&OperationSpec> {
        self.specs.get(operation)
    }

    /// Operation whose success first reaches `phase`.
    pub fn producer_of(&self, phase: WorkflowPhase) -> Option<&'static str> {
        OPERATION_NAMES.iter().copied().find(|name| {
            self.specs
                .get(name)
                .is_some_and(|s| s.resulting == Some(phase) && !s.back_edge)
        })
    }

    /// Reject an operation whose precondition the current phase does not meet.
    pub fn check(&self, operation: &str, phase: WorkflowPhase) -> Result<&OperationSpec> {
        let spec = self.get(operation).ok_or_else(|| {
            OrchestratorError::InvalidRequest(format!("unknown operation: {}", operation))
        })?;

        if phase < spec.min {
            let missing = self.producer_of(spec.min);
            return Err(OrchestratorError::sequence(
                operation,
                phase,
                missing,
                format!("requires phase {} or later", spec.min),
            ));
        }
        if phase > spec.max {
            let reason = if spec.min == spec.max {
                format!("only allowed in phase {}", spec.min)
            } else {
                format!("not allowed after phase {}", spec.max)
            };
            let missing = if spec.min == WorkflowPhase::Uninitialized {
                Some("close_project")
            } else {
                None
            };
            return Err(OrchestratorError::sequence(operation, phase, missing, reason));
        }
        Ok(spec)
    }
}

pub fn standard_specs() -> Vec<OperationSpec> {
    use WorkflowPhase::*;

    vec![
        OperationSpec::new("create_project", Uninitialized)
            .exactly()
            .resulting(ProjectCreated),
        OperationSpec::new("add_flowsheet", ProjectCreated)
            .exactly()
            .resulting(FlowsheetCreated)
            .with_fallback(),
        OperationSpec::new("add_components", FlowsheetCreated)
            .up_to(TopologyBuilt)
            .resulting(ComponentsConfigured),
        OperationSpec::new("create_block", ComponentsConfigured)
            .up_to(TopologyBuilt)
            .with_fallback(),
        OperationSpec::new("create_stream", ComponentsConfigured)
            .up_to(TopologyBuilt)
            .with_fallback(),
        OperationSpec::new("connect_stream", ComponentsConfigured)
            .up_to(TopologyBuilt)
            .resulting(TopologyBuilt)
            .with_fallback(),
        OperationSpec::new("set_stream_properties", TopologyBuilt)
            .resulting(PropertiesSet)
            .with_fallback(),
        OperationSpec::new("set_stream_composition", PropertiesSet)
            .resulting(CompositionSet)
            .with_fallback(),
        OperationSpec::new("flash_stream", CompositionSet).resulting(Flashed),
        OperationSpec::new("run_simulation", Flashed).resulting(Solved),
        OperationSpec::new("get_results", Solved).resulting(ResultsRetrieved),
        OperationSpec::new("adjust_parameters", Solved)
            .back_edge_to(PropertiesSet)
            .with_fallback(),
        OperationSpec::new("save_project", ProjectCreated).with_fallback(),
        OperationSpec::new("list_components", FlowsheetCreated),
        OperationSpec::new("list_streams", FlowsheetCreated),
        OperationSpec::new("close_project", ProjectCreated).back_edge_to(Uninitialized),
    ]
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowPhase::*;

    fn missing_of(err: OrchestratorError) -> Option<String> {
        match err {
            OrchestratorError::Sequence { missing, .. } => missing,
            other => panic!("expected sequence error, got {other:?}"),
        }
    }

    #[test]
    fn test_standard_covers_every_operation() {
        assert!(OperationRegistry::new(standard_specs()).is_ok());
        let registry = OperationRegistry::standard();
        for name in OPERATION_NAMES {
            assert!(registry.get(name).is_some(), "{name} missing");
        }
    }

    #[test]
    fn test_run_simulation_before_flash_names_flash() {
        let registry = OperationRegistry::standard();
        let err = registry.check("run_simulation", CompositionSet).unwrap_err();
        assert_eq!(missing_of(err).as_deref(), Some("flash_stream"));
    }

    #[test]
    fn test_composition_before_components_is_sequence_error() {
        let registry = OperationRegistry::standard();
        let err = registry
            .check("set_stream_composition", FlowsheetCreated)
            .unwrap_err();
        assert_eq!(missing_of(err).as_deref(), Some("set_stream_properties"));
    }

    #[test]
    fn test_topology_edits_close_after_properties() {
        let registry = OperationRegistry::standard();
        assert!(registry.check("create_block", TopologyBuilt).is_ok());
        assert!(registry.check("create_block", PropertiesSet).is_err());
        assert!(registry.check("add_components", CompositionSet).is_err());
    }

    #[test]
    fn test_create_project_only_once() {
        let registry = OperationRegistry::standard();
        let err = registry.check("create_project", ProjectCreated).unwrap_err();
        assert_eq!(missing_of(err).as_deref(), Some("close_project"));
    }

    #[test]
    fn test_unknown_operation() {
        let registry = OperationRegistry::standard();
        assert!(matches!(
            registry.check("explode", Solved),
            Err(OrchestratorError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_rejects_missing_operation() {
        let specs = vec![OperationSpec::new("create_project", Uninitialized)];
        let err = OperationRegistry::new(specs).unwrap_err();
        assert!(err.to_string().contains("add_flowsheet"));
    }

    #[test]
    fn test_rejects_duplicate_operation() {
        let mut specs: Vec<OperationSpec> = OPERATION_NAMES
            .iter()
            .map(|name| OperationSpec::new(*name, Uninitialized))
            .collect();
        specs.push(OperationSpec::new("flash_stream", Flashed));

        let err = OperationRegistry::new(specs).unwrap_err();
        assert!(err.to_string().contains("registered twice"));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let mut specs: Vec<OperationSpec> = OPERATION_NAMES
            .iter()
            .map(|name| OperationSpec::new(*name, Uninitialized))
            .collect();
        specs[0] = OperationSpec::new("create_project", Solved).up_to(ProjectCreated);

        assert!(OperationRegistry::new(specs).is_err());
    }

    #[test]
    fn test_fallback_eligibility() {
        let registry = OperationRegistry::standard();
        assert!(registry.get("create_block").unwrap().fallback_eligible);
        assert!(!registry.get("run_simulation").unwrap().fallback_eligible);
    }
}
