use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::composition::Composition;
use super::species::ComponentSet;
use super::units::PhaseProperties;

/// Outcome of a solve. A non-converged solve is a normal result, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct SimulationOutcome {
    pub converged: bool,
    pub status_code: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

/// A property that can be requested from `get_results`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResultField {
    Temperature,
    Pressure,
    MolarFlow,
    MassFlow,
    VaporFraction,
    Composition,
}

impl ResultField {
    pub const ALL: [ResultField; 6] = [
        Self::Temperature,
        Self::Pressure,
        Self::MolarFlow,
        Self::MassFlow,
        Self::VaporFraction,
        Self::Composition,
    ];
}

/// Solved values for one stream, in domain units.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct StreamResults {
    pub stream: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure_kpa: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub molar_flow_kmol_h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_flow_kg_h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vapor_fraction: Option<f64>,
    /// Mole fractions keyed by species name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub composition: BTreeMap<String, f64>,
}

impl StreamResults {
    pub fn from_canonical(
        stream: impl Into<String>,
        properties: &PhaseProperties,
        composition: Option<&Composition>,
        components: &ComponentSet,
        fields: &[ResultField],
    ) -> Self {
        let domain = properties.to_domain();
        let wants = |field: ResultField| fields.contains(&field);

        Self {
            stream: stream.into(),
            temperature_c: domain.temperature_c.filter(|_| wants(ResultField::Temperature)),
            pressure_kpa: domain.pressure_kpa.filter(|_| wants(ResultField::Pressure)),
            molar_flow_kmol_h: domain
                .molar_flow_kmol_h
                .filter(|_| wants(ResultField::MolarFlow)),
            mass_flow_kg_h: domain.mass_flow_kg_h.filter(|_| wants(ResultField::MassFlow)),
            vapor_fraction: properties
                .vapor_fraction
                .filter(|_| wants(ResultField::VaporFraction)),
            composition: match composition {
                Some(c) if wants(ResultField::Composition) => c.to_map(components),
                _ => BTreeMap::new(),
            },
        }
    }

    pub fn mole_fraction(&self, species: &str) -> Option<f64> {
        let canonical = super::species::resolve_species(species).name;
        self.composition
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&canonical))
            .map(|(_, x)| *x)
    }
}
