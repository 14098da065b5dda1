//! Target comparison and adjustment heuristics.
//!
//! Suggestions come from a fixed rule table keyed by the failed target's
//! property and the direction of its deviation. There is no search: each
//! rule proposes one step for one manipulated variable.

use std::collections::BTreeMap;

use procflow_core::{
    AdjustmentSuggestion, Assessment, AssessmentReport, Comparison, PerformanceTarget,
    StreamResults, TargetProperty,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deviation {
    TooHigh,
    TooLow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    AcidGasSlip,
    SolventLoading,
    Temperature,
    Pressure,
    MolarFlow,
    MassFlow,
    VaporFraction,
}

impl TargetKind {
    fn of(property: &TargetProperty) -> Self {
        match property {
            TargetProperty::Ppm { .. } | TargetProperty::MoleFraction { .. } => Self::AcidGasSlip,
            TargetProperty::SolventLoading { .. } => Self::SolventLoading,
            TargetProperty::Temperature => Self::Temperature,
            TargetProperty::Pressure => Self::Pressure,
            TargetProperty::MolarFlow => Self::MolarFlow,
            TargetProperty::MassFlow => Self::MassFlow,
            TargetProperty::VaporFraction => Self::VaporFraction,
        }
    }
}

/// How a rule moves its manipulated variable.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    /// Multiply the current value.
    Scale(f64),
    /// Add to the current value.
    Shift(f64),
    /// Cancel the observed deviation one to one.
    OffsetDeviation,
    /// Scale by target / observed.
    RatioToTarget,
}

#[derive(Debug, Clone, Copy)]
enum Variable {
    MolarFlow,
    MassFlow,
    Temperature,
    Pressure,
}

impl Variable {
    fn read(&self, results: &StreamResults) -> Option<f64> {
        match self {
            Self::MolarFlow => results.molar_flow_kmol_h,
            Self::MassFlow => results.mass_flow_kg_h,
            Self::Temperature => results.temperature_c,
            Self::Pressure => results.pressure_kpa,
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            Self::MolarFlow => "kmol/h",
            Self::MassFlow => "kg/h",
            Self::Temperature => "°C",
            Self::Pressure => "kPa",
        }
    }
}

struct Rule {
    parameter: &'static str,
    variable: Variable,
    step: Step,
    rationale: &'static str,
    expected_impact: &'static str,
}

fn rules(kind: TargetKind, deviation: Deviation) -> Vec<Rule> {
    use Deviation::*;
    use TargetKind::*;

    match (kind, deviation) {
        (AcidGasSlip, TooHigh) => vec![
            Rule {
                parameter: "Lean amine circulation rate (molar flow)",
                variable: Variable::MolarFlow,
                step: Step::Scale(1.15),
                rationale: "More counter-flowing absorbent lowers the equilibrium acid gas partial pressure at the top of the column",
                expected_impact: "Lower acid gas in the treated gas, higher reboiler duty",
            },
            Rule {
                parameter: "Lean amine temperature",
                variable: Variable::Temperature,
                step: Step::Shift(-5.0),
                rationale: "A colder solvent absorbs acid gas more strongly",
                expected_impact: "Lower acid gas slip; keep the solvent above the gas dew point to avoid hydrocarbon condensation",
            },
        ],
        (AcidGasSlip, TooLow) => vec![Rule {
            parameter: "Lean amine circulation rate (molar flow)",
            variable: Variable::MolarFlow,
            step: Step::Scale(0.90),
            rationale: "Treating beats the target; less circulation saves regeneration energy",
            expected_impact: "Acid gas slip rises toward the limit, lower reboiler duty",
        }],
        (SolventLoading, TooHigh) => vec![Rule {
            parameter: "Lean amine circulation rate (molar flow)",
            variable: Variable::MolarFlow,
            step: Step::Scale(1.15),
            rationale: "Rich loading above the limit risks corrosion and acid gas breakthrough",
            expected_impact: "Lower rich solvent loading",
        }],
        (SolventLoading, TooLow) => vec![Rule {
            parameter: "Lean amine circulation rate (molar flow)",
            variable: Variable::MolarFlow,
            step: Step::Scale(0.90),
            rationale: "The solvent is under-used",
            expected_impact: "Higher rich loading, lower circulation cost",
        }],
        (Temperature, _) => vec![Rule {
            parameter: "Feed temperature",
            variable: Variable::Temperature,
            step: Step::OffsetDeviation,
            rationale: "Outlet temperature tracks the feed temperature",
            expected_impact: "Outlet temperature moves toward the target",
        }],
        (Pressure, _) => vec![Rule {
            parameter: "Feed pressure",
            variable: Variable::Pressure,
            step: Step::OffsetDeviation,
            rationale: "Outlet pressure tracks the feed pressure",
            expected_impact: "Outlet pressure moves toward the target",
        }],
        (MolarFlow, _) => vec![Rule {
            parameter: "Feed molar flow",
            variable: Variable::MolarFlow,
            step: Step::RatioToTarget,
            rationale: "Outlet flow scales with the feed",
            expected_impact: "Outlet molar flow moves toward the target",
        }],
        (MassFlow, _) => vec![Rule {
            parameter: "Feed mass flow",
            variable: Variable::MassFlow,
            step: Step::RatioToTarget,
            rationale: "Outlet flow scales with the feed",
            expected_impact: "Outlet mass flow moves toward the target",
        }],
        (VaporFraction, TooHigh) => vec![Rule {
            parameter: "Feed temperature",
            variable: Variable::Temperature,
            step: Step::Shift(-5.0),
            rationale: "Cooling condenses the heavier components",
            expected_impact: "Lower vapor fraction",
        }],
        (VaporFraction, TooLow) => vec![Rule {
            parameter: "Feed temperature",
            variable: Variable::Temperature,
            step: Step::Shift(5.0),
            rationale: "Heating vaporizes the lighter components",
            expected_impact: "Higher vapor fraction",
        }],
    }
}

/// Compares solved stream results with performance targets.
pub struct ResultAggregator;

impl ResultAggregator {
    /// `results` is keyed by stream name. A target whose stream or property
    /// is missing fails with no observation.
    pub fn assess(
        targets: &[PerformanceTarget],
        results: &BTreeMap<String, StreamResults>,
    ) -> AssessmentReport {
        let assessments: Vec<Assessment> = targets
            .iter()
            .map(|target| {
                let observed = results
                    .get(&target.stream)
                    .and_then(|r| target.property.observe(r));
                Assessment::evaluate(target, observed)
            })
            .collect();

        let passed = assessments.iter().filter(|a| a.pass).count();
        let suggestions: Vec<AdjustmentSuggestion> = assessments
            .iter()
            .filter(|a| !a.pass)
            .flat_map(|a| Self::suggest(a, results))
            .collect();

        debug!(
            targets = assessments.len(),
            passed,
            suggestions = suggestions.len(),
            "Targets assessed"
        );

        AssessmentReport {
            all_passed: passed == assessments.len(),
            summary: format!("{}/{} targets met", passed, assessments.len()),
            assessments,
            suggestions,
        }
    }

    fn suggest(
        assessment: &Assessment,
        results: &BTreeMap<String, StreamResults>,
    ) -> Vec<AdjustmentSuggestion> {
        let target = &assessment.target;
        let (Some(observed), Some(deviation)) = (assessment.observed, assessment.deviation) else {
            return Vec::new();
        };
        let direction = match target.comparison {
            Comparison::Le => Deviation::TooHigh,
            Comparison::Ge => Deviation::TooLow,
            Comparison::Eq if deviation > 0.0 => Deviation::TooHigh,
            Comparison::Eq => Deviation::TooLow,
        };

        let manipulated = target
            .manipulated_stream
            .clone()
            .unwrap_or_else(|| target.stream.clone());
        let source = results.get(&manipulated);
        let fallback = results.get(&target.stream);

        rules(TargetKind::of(&target.property), direction)
            .into_iter()
            .map(|rule| {
                let current = source
                    .and_then(|r| rule.variable.read(r))
                    .or_else(|| fallback.and_then(|r| rule.variable.read(r)));
                let suggested = current.map(|value| match rule.step {
                    Step::Scale(factor) => value * factor,
                    Step::Shift(delta) => value + delta,
                    Step::OffsetDeviation => value - deviation,
                    Step::RatioToTarget if observed != 0.0 => value * target.value / observed,
                    Step::RatioToTarget => value,
                });
                AdjustmentSuggestion {
                    parameter: rule.parameter.to_string(),
                    stream: Some(manipulated.clone()),
                    current_value: current,
                    suggested_value: suggested,
                    unit: rule.variable.unit().to_string(),
                    rationale: rule.rationale.to_string(),
                    expected_impact: format!(
                        "{} ({} {} {} {}, observed {:.4})",
                        rule.expected_impact,
                        target.property.describe(),
                        target.comparison.as_str(),
                        target.value,
                        target.unit,
                        observed
                    ),
                }
            })
            .collect()
    }
}
