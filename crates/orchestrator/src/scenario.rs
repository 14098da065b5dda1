//! The 301-E amine treater: sour gas (stream 210) scrubbed by lean MDEA
//! (stream 220) into treated gas (211) and rich amine (222).

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use procflow_core::units::kgcm2g_to_kpa;
use procflow_core::{
    AdjustmentSuggestion, AssessmentReport, Backend, BlockKind, Comparison, CompositionInput,
    PerformanceTarget, SimulationOutcome, StreamConditions, StreamDirection, TargetProperty,
    WorkflowPhase,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::operation::{Operation, OperationOutput, OperationResponse, SpeciesList};
use crate::session_manager::SessionManager;

pub const BLOCK: &str = "301-E";
pub const SOUR_GAS: &str = "210";
pub const TREATED_GAS: &str = "211";
pub const LEAN_AMINE: &str = "220";
pub const RICH_AMINE: &str = "222";

pub const COMPONENTS: [&str; 14] = [
    "Methane",
    "Ethane",
    "Propane",
    "n-Butane",
    "Isobutane",
    "n-Pentane",
    "Carbon Dioxide",
    "Hydrogen Sulfide",
    "Water",
    "MDEA",
    "Hydrogen",
    "Carbon Monoxide",
    "n-Hexane",
    "n-Heptane",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioCase {
    Base,
    /// Lean amine carrying 0.02 mol H2S per mol MDEA.
    HighLoading,
}

impl ScenarioCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::HighLoading => "high-loading",
        }
    }
}

impl fmt::Display for ScenarioCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioCase {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base" => Ok(Self::Base),
            "high-loading" | "high_loading" => Ok(Self::HighLoading),
            other => Err(OrchestratorError::InvalidRequest(format!(
                "unknown scenario '{}', expected base or high-loading",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AmineTreaterScenario {
    pub case: ScenarioCase,
}

impl AmineTreaterScenario {
    pub fn new(case: ScenarioCase) -> Self {
        Self { case }
    }

    pub fn sour_gas_conditions() -> StreamConditions {
        StreamConditions {
            temperature_c: Some(43.0),
            pressure_kpa: Some(kgcm2g_to_kpa(4.6)),
            molar_flow_kmol_h: None,
            mass_flow_kg_h: Some(4536.0),
        }
    }

    pub fn lean_amine_conditions() -> StreamConditions {
        StreamConditions {
            temperature_c: Some(50.0),
            pressure_kpa: Some(kgcm2g_to_kpa(5.7)),
            molar_flow_kmol_h: None,
            mass_flow_kg_h: Some(46_000.0),
        }
    }

    /// Component mass flows of the sour gas, kg/h.
    pub fn sour_gas_composition() -> CompositionInput {
        CompositionInput::MassFlowsKgH(
            [
                ("Hydrogen", 176.0),
                ("Water", 8.0),
                ("Carbon Monoxide", 7.0),
                ("Carbon Dioxide", 450.0),
                ("Hydrogen Sulfide", 8.0),
                ("Methane", 302.0),
                ("Ethane", 343.0),
                ("Propane", 2426.0),
                ("n-Butane", 178.0),
                ("Isobutane", 239.0),
                ("n-Pentane", 381.0),
                ("n-Hexane", 3.0),
                ("n-Heptane", 15.0),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        )
    }

    pub fn lean_amine_composition(&self) -> CompositionInput {
        let (water, h2s) = match self.case {
            ScenarioCase::Base => (0.699, 0.001),
            ScenarioCase::HighLoading => (0.694, 0.006),
        };
        CompositionInput::Fractions(BTreeMap::from([
            ("Water".to_string(), water),
            ("Hydrogen Sulfide".to_string(), h2s),
            ("MDEA".to_string(), 0.300),
        ]))
    }

    /// Everything after `create_project` up to a solved flowsheet.
    pub fn build_operations(&self) -> Vec<Operation> {
        vec![
            Operation::AddFlowsheet {
                name: "Amine Treating".to_string(),
            },
            Operation::AddComponents {
                components: SpeciesList::List(COMPONENTS.iter().map(|c| c.to_string()).collect()),
            },
            Operation::CreateBlock {
                kind: BlockKind::AmineTreater,
                name: BLOCK.to_string(),
            },
            Operation::CreateStream {
                name: SOUR_GAS.to_string(),
            },
            Operation::CreateStream {
                name: LEAN_AMINE.to_string(),
            },
            Operation::CreateStream {
                name: TREATED_GAS.to_string(),
            },
            Operation::CreateStream {
                name: RICH_AMINE.to_string(),
            },
            Operation::connect(LEAN_AMINE, BLOCK, StreamDirection::Inlet, 1),
            Operation::connect(SOUR_GAS, BLOCK, StreamDirection::Inlet, 2),
            Operation::connect(TREATED_GAS, BLOCK, StreamDirection::Outlet, 1),
            Operation::connect(RICH_AMINE, BLOCK, StreamDirection::Outlet, 2),
            Operation::set_properties(SOUR_GAS, Self::sour_gas_conditions()),
            Operation::set_properties(LEAN_AMINE, Self::lean_amine_conditions()),
            Operation::SetStreamComposition {
                stream: SOUR_GAS.to_string(),
                composition: Self::sour_gas_composition(),
            },
            Operation::SetStreamComposition {
                stream: LEAN_AMINE.to_string(),
                composition: self.lean_amine_composition(),
            },
            Operation::FlashStream {
                stream: SOUR_GAS.to_string(),
            },
            Operation::FlashStream {
                stream: LEAN_AMINE.to_string(),
            },
            Operation::RunSimulation,
        ]
    }

    pub fn targets() -> Vec<PerformanceTarget> {
        vec![
            PerformanceTarget::new(
                "Treated gas H2S",
                TREATED_GAS,
                TargetProperty::Ppm {
                    component: "H2S".to_string(),
                },
                Comparison::Le,
                100.0,
                "ppm(mol)",
            )
            .with_manipulated_stream(LEAN_AMINE),
            PerformanceTarget::new(
                "Rich amine loading",
                RICH_AMINE,
                TargetProperty::SolventLoading {
                    solute: "H2S".to_string(),
                    solvent: "MDEA".to_string(),
                },
                Comparison::Le,
                0.45,
                "mol/mol",
            )
            .with_manipulated_stream(LEAN_AMINE),
        ]
    }

    /// Lean amine flow change suggested by a failed assessment.
    pub fn amine_flow_adjustment(report: &AssessmentReport) -> Option<(AdjustmentSuggestion, Operation)> {
        let suggestion = report.suggestions.iter().find(|s| {
            s.stream.as_deref() == Some(LEAN_AMINE) && s.parameter.contains("circulation")
        })?;
        let flow = suggestion.suggested_value?;
        let operation = Operation::adjust(
            LEAN_AMINE,
            StreamConditions {
                molar_flow_kmol_h: Some(flow),
                ..Default::default()
            },
        );
        Some((suggestion.clone(), operation))
    }

    /// Steps after `adjust_parameters` that bring the lean amine back to a
    /// solved flowsheet.
    pub fn rerun_operations(&self) -> Vec<Operation> {
        vec![
            Operation::SetStreamComposition {
                stream: LEAN_AMINE.to_string(),
                composition: self.lean_amine_composition(),
            },
            Operation::FlashStream {
                stream: LEAN_AMINE.to_string(),
            },
            Operation::RunSimulation,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub operation: String,
    pub backend: Backend,
    pub attempts: u32,
    pub phase: WorkflowPhase,
    pub message: String,
}

impl From<&OperationResponse> for StepReport {
    fn from(response: &OperationResponse) -> Self {
        Self {
            operation: response.operation.clone(),
            backend: response.backend,
            attempts: response.attempts,
            phase: response.phase,
            message: response.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerunReport {
    pub adjustment: AdjustmentSuggestion,
    pub steps: Vec<StepReport>,
    pub outcome: Option<SimulationOutcome>,
    pub assessment: AssessmentReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub case: ScenarioCase,
    pub session_id: Uuid,
    pub steps: Vec<StepReport>,
    pub outcome: Option<SimulationOutcome>,
    pub assessment: AssessmentReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerun: Option<RerunReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,
}

/// Build, solve and assess the scenario on a fresh session. With `adjust`,
/// a failed assessment is followed by one adjusted re-run. The session is
/// left open for inspection.
pub async fn run_scenario(
    manager: &SessionManager,
    case: ScenarioCase,
    adjust: bool,
) -> Result<ScenarioReport> {
    let scenario = AmineTreaterScenario::new(case);
    let (session_id, created) = manager.create_session().await?;
    info!(session_id = %session_id, case = %case, "Running amine treater scenario");

    let mut steps = vec![StepReport::from(&created)];
    let mut outcome = None;
    for operation in scenario.build_operations() {
        let response = manager.dispatch(session_id, &operation).await?;
        outcome = simulation_outcome(&response).or(outcome);
        steps.push(StepReport::from(&response));
    }

    let targets = AmineTreaterScenario::targets();
    let assessment = manager.assess(session_id, &targets).await?;
    info!(session_id = %session_id, summary = %assessment.summary, "Scenario assessed");

    let mut rerun = None;
    if adjust && !assessment.all_passed {
        if let Some((adjustment, operation)) = AmineTreaterScenario::amine_flow_adjustment(&assessment) {
            let mut rerun_steps = Vec::new();
            let mut rerun_outcome = None;
            let response = manager.dispatch(session_id, &operation).await?;
            rerun_steps.push(StepReport::from(&response));
            for operation in scenario.rerun_operations() {
                let response = manager.dispatch(session_id, &operation).await?;
                rerun_outcome = simulation_outcome(&response).or(rerun_outcome);
                rerun_steps.push(StepReport::from(&response));
            }
            let assessment = manager.assess(session_id, &targets).await?;
            info!(session_id = %session_id, summary = %assessment.summary, "Adjusted re-run assessed");
            rerun = Some(RerunReport {
                adjustment,
                steps: rerun_steps,
                outcome: rerun_outcome,
                assessment,
            });
        }
    }

    let saved = manager
        .dispatch(session_id, &Operation::SaveProject { path: None })
        .await?;
    let project_path = match &saved.output {
        OperationOutput::ProjectSaved { path } => Some(path.clone()),
        _ => None,
    };
    steps.push(StepReport::from(&saved));

    Ok(ScenarioReport {
        case,
        session_id,
        steps,
        outcome,
        assessment,
        rerun,
        project_path,
    })
}

fn simulation_outcome(response: &OperationResponse) -> Option<SimulationOutcome> {
    match &response.output {
        OperationOutput::Simulation { outcome } => Some(outcome.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use procflow_core::ComponentSet;

    use super::*;

    #[test]
    fn test_case_parsing() {
        assert_eq!("base".parse::<ScenarioCase>().unwrap(), ScenarioCase::Base);
        assert_eq!(
            "high-loading".parse::<ScenarioCase>().unwrap(),
            ScenarioCase::HighLoading
        );
        assert!("extreme".parse::<ScenarioCase>().is_err());
    }

    #[test]
    fn test_feed_compositions_normalize() {
        let components: ComponentSet = COMPONENTS.iter().map(|c| c.to_string()).collect();

        let sour = AmineTreaterScenario::sour_gas_composition()
            .align(&components)
            .unwrap();
        assert!(sour.is_normalized());

        for case in [ScenarioCase::Base, ScenarioCase::HighLoading] {
            let lean = AmineTreaterScenario::new(case)
                .lean_amine_composition()
                .align(&components)
                .unwrap();
            assert!(lean.is_normalized());
        }
    }

    #[test]
    fn test_high_loading_ratio() {
        let components: ComponentSet = COMPONENTS.iter().map(|c| c.to_string()).collect();
        let lean = AmineTreaterScenario::new(ScenarioCase::HighLoading)
            .lean_amine_composition()
            .align(&components)
            .unwrap();
        let h2s = lean.fraction_of(&components, "H2S").unwrap();
        let mdea = lean.fraction_of(&components, "MDEA").unwrap();
        assert!((h2s / mdea - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_sour_gas_flows_total_feed() {
        let CompositionInput::MassFlowsKgH(flows) = AmineTreaterScenario::sour_gas_composition() else {
            panic!("expected mass flows");
        };
        let total: f64 = flows.values().sum();
        assert!((total - 4536.0).abs() < 1e-9);
    }
}
