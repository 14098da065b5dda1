use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::results::StreamResults;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
pub enum Comparison {
    #[serde(rename = "<=", alias = "le")]
    Le,
    #[serde(rename = ">=", alias = "ge")]
    Ge,
    #[serde(rename = "==", alias = "eq")]
    Eq,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
        }
    }

    pub fn holds(&self, observed: f64, target: f64, tolerance: f64) -> bool {
        match self {
            Self::Le => observed <= target,
            Self::Ge => observed >= target,
            Self::Eq => (observed - target).abs() <= tolerance,
        }
    }
}

/// Stream property a target is evaluated against, in domain units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetProperty {
    /// °C
    Temperature,
    /// kPa
    Pressure,
    /// kmol/h
    MolarFlow,
    /// kg/h
    MassFlow,
    VaporFraction,
    MoleFraction { component: String },
    /// Mole fraction × 10⁶.
    Ppm { component: String },
    /// Moles of solute per mole of solvent.
    SolventLoading { solute: String, solvent: String },
}

impl TargetProperty {
    pub fn observe(&self, results: &StreamResults) -> Option<f64> {
        match self {
            Self::Temperature => results.temperature_c,
            Self::Pressure => results.pressure_kpa,
            Self::MolarFlow => results.molar_flow_kmol_h,
            Self::MassFlow => results.mass_flow_kg_h,
            Self::VaporFraction => results.vapor_fraction,
            Self::MoleFraction { component } => results.mole_fraction(component),
            Self::Ppm { component } => results.mole_fraction(component).map(|x| x * 1e6),
            Self::SolventLoading { solute, solvent } => {
                let x_solute = results.mole_fraction(solute)?;
                let x_solvent = results.mole_fraction(solvent)?;
                (x_solvent > 0.0).then(|| x_solute / x_solvent)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Temperature => "temperature".to_string(),
            Self::Pressure => "pressure".to_string(),
            Self::MolarFlow => "molar flow".to_string(),
            Self::MassFlow => "mass flow".to_string(),
            Self::VaporFraction => "vapor fraction".to_string(),
            Self::MoleFraction { component } => format!("{} mole fraction", component),
            Self::Ppm { component } => format!("{} ppm(mol)", component),
            Self::SolventLoading { solute, solvent } => {
                format!("{}/{} loading", solute, solvent)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PerformanceTarget {
    pub name: String,
    pub stream: String,
    pub property: TargetProperty,
    pub comparison: Comparison,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    /// Absolute tolerance for `==` targets.
    #[serde(default)]
    pub tolerance: f64,
    /// Stream whose flow sizes adjustment suggestions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manipulated_stream: Option<String>,
}

impl PerformanceTarget {
    pub fn new(
        name: impl Into<String>,
        stream: impl Into<String>,
        property: TargetProperty,
        comparison: Comparison,
        value: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            stream: stream.into(),
            property,
            comparison,
            value,
            unit: unit.into(),
            tolerance: 0.0,
            manipulated_stream: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_manipulated_stream(mut self, stream: impl Into<String>) -> Self {
        self.manipulated_stream = Some(stream.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Assessment {
    pub target: PerformanceTarget,
    pub observed: Option<f64>,
    pub pass: bool,
    /// `observed - target`
    pub deviation: Option<f64>,
    pub deviation_percent: Option<f64>,
}

impl Assessment {
    pub fn evaluate(target: &PerformanceTarget, observed: Option<f64>) -> Self {
        let Some(value) = observed else {
            return Self {
                target: target.clone(),
                observed: None,
                pass: false,
                deviation: None,
                deviation_percent: None,
            };
        };

        let deviation = value - target.value;
        Self {
            target: target.clone(),
            observed: Some(value),
            pass: target.comparison.holds(value, target.value, target.tolerance),
            deviation: Some(deviation),
            deviation_percent: (target.value != 0.0).then(|| deviation / target.value * 100.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct AdjustmentSuggestion {
    pub parameter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    pub current_value: Option<f64>,
    pub suggested_value: Option<f64>,
    pub unit: String,
    pub rationale: String,
    pub expected_impact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct AssessmentReport {
    pub assessments: Vec<Assessment>,
    pub all_passed: bool,
    pub summary: String,
    pub suggestions: Vec<AdjustmentSuggestion>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn treated_gas(h2s: f64) -> StreamResults {
        StreamResults {
            stream: "211".to_string(),
            composition: BTreeMap::from([
                ("Hydrogen Sulfide".to_string(), h2s),
                ("Methane".to_string(), 1.0 - h2s),
            ]),
            ..Default::default()
        }
    }

    fn h2s_target() -> PerformanceTarget {
        PerformanceTarget::new(
            "Treated gas H2S",
            "211",
            TargetProperty::Ppm {
                component: "H2S".to_string(),
            },
            Comparison::Le,
            100.0,
            "ppm(mol)",
        )
    }

    #[test]
    fn test_ppm_target_passes_below_limit() {
        let target = h2s_target();
        let observed = target.property.observe(&treated_gas(40e-6));
        let assessment = Assessment::evaluate(&target, observed);

        assert!(assessment.pass);
        assert!((assessment.deviation.unwrap() + 60.0).abs() < 1e-6);
        assert!((assessment.deviation_percent.unwrap() + 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_ppm_target_fails_above_limit() {
        let target = h2s_target();
        let observed = target.property.observe(&treated_gas(250e-6));
        assert!(!Assessment::evaluate(&target, observed).pass);
    }

    #[test]
    fn test_missing_observation_fails() {
        let assessment = Assessment::evaluate(&h2s_target(), None);
        assert!(!assessment.pass);
        assert!(assessment.deviation.is_none());
    }

    #[test]
    fn test_equality_uses_tolerance() {
        assert!(Comparison::Eq.holds(50.04, 50.0, 0.05));
        assert!(!Comparison::Eq.holds(50.1, 50.0, 0.05));
    }

    #[test]
    fn test_comparison_accepts_symbol_and_word() {
        let symbol: Comparison = serde_json::from_str("\">=\"").unwrap();
        let word: Comparison = serde_json::from_str("\"ge\"").unwrap();
        assert_eq!(symbol, Comparison::Ge);
        assert_eq!(word, Comparison::Ge);
    }
}
