use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::species::ComponentSet;
use crate::error::CoreError;

/// Allowed deviation of a mole-fraction sum from 1.0.
pub const COMPOSITION_TOLERANCE: f64 = 1e-3;

/// Mole fractions aligned positionally with the session's `ComponentSet`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Composition(Vec<f64>);

impl Composition {
    pub fn new(fractions: Vec<f64>) -> Self {
        Self(fractions)
    }

    pub fn fractions(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= COMPOSITION_TOLERANCE
    }

    pub fn has_negative(&self) -> bool {
        self.0.iter().any(|x| *x < 0.0)
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    /// Fraction of a named species, resolved against `components`.
    pub fn fraction_of(&self, components: &ComponentSet, species: &str) -> Option<f64> {
        components.index_of(species).and_then(|i| self.get(i))
    }

    pub fn to_map(&self, components: &ComponentSet) -> BTreeMap<String, f64> {
        components
            .iter()
            .zip(self.0.iter())
            .map(|(name, x)| (name.to_string(), *x))
            .collect()
    }

    /// Average molar mass in g/mol.
    pub fn mean_molar_mass(&self, components: &ComponentSet) -> Result<f64, CoreError> {
        let masses = components.molar_masses()?;
        Ok(masses.iter().zip(self.0.iter()).map(|(m, x)| m * x).sum())
    }
}

/// A composition as a caller supplies it.
///
/// Keyed forms are aligned to the `ComponentSet`; species missing from a
/// keyed map are taken as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompositionInput {
    /// Mole fractions keyed by species name or alias.
    Fractions(BTreeMap<String, f64>),
    /// Mole fractions already in `ComponentSet` order.
    Vector(Vec<f64>),
    /// Component mass flows in kg/h, converted to mole fractions.
    MassFlowsKgH(BTreeMap<String, f64>),
}

impl CompositionInput {
    /// Align this input with `components`.
    ///
    /// A vector is passed through unchanged so the caller's length can be
    /// checked against the set. Keyed inputs reject species that are not
    /// registered.
    pub fn align(&self, components: &ComponentSet) -> Result<Composition, CoreError> {
        match self {
            Self::Vector(values) => Ok(Composition::new(values.clone())),
            Self::Fractions(map) => Ok(Composition::new(keyed_to_positional(map, components)?)),
            Self::MassFlowsKgH(map) => {
                let masses = keyed_to_positional(map, components)?;
                let molar_masses = components.molar_masses()?;
                let moles: Vec<f64> = masses
                    .iter()
                    .zip(molar_masses.iter())
                    .map(|(m, mw)| m / mw)
                    .collect();
                let total: f64 = moles.iter().sum();
                if total <= 0.0 {
                    return Ok(Composition::new(moles));
                }
                Ok(Composition::new(moles.into_iter().map(|n| n / total).collect()))
            }
        }
    }
}

fn keyed_to_positional(
    map: &BTreeMap<String, f64>,
    components: &ComponentSet,
) -> Result<Vec<f64>, CoreError> {
    let mut values = vec![0.0; components.len()];
    for (species, value) in map {
        let index = components
            .index_of(species)
            .ok_or_else(|| CoreError::UnregisteredSpecies(species.clone()))?;
        values[index] += *value;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amine_set() -> ComponentSet {
        ["Water", "Hydrogen Sulfide", "MDEA"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_keyed_fractions_align_to_component_order() {
        let input = CompositionInput::Fractions(BTreeMap::from([
            ("MDEA".to_string(), 0.300),
            ("H2S".to_string(), 0.001),
            ("water".to_string(), 0.699),
        ]));
        let composition = input.align(&amine_set()).unwrap();

        assert_eq!(composition.fractions(), &[0.699, 0.001, 0.300]);
        assert!(composition.is_normalized());
    }

    #[test]
    fn test_unregistered_species_rejected() {
        let input = CompositionInput::Fractions(BTreeMap::from([("Argon".to_string(), 1.0)]));
        assert_eq!(
            input.align(&amine_set()),
            Err(CoreError::UnregisteredSpecies("Argon".to_string()))
        );
    }

    #[test]
    fn test_mass_flows_convert_to_mole_fractions() {
        let input = CompositionInput::MassFlowsKgH(BTreeMap::from([
            ("Water".to_string(), 18.015),
            ("MDEA".to_string(), 119.163),
        ]));
        let composition = input.align(&amine_set()).unwrap();

        assert!((composition.fractions()[0] - 0.5).abs() < 1e-9);
        assert_eq!(composition.fractions()[1], 0.0);
        assert!((composition.fractions()[2] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_sum_tolerance() {
        assert!(Composition::new(vec![0.5, 0.4995]).is_normalized());
        assert!(!Composition::new(vec![0.5, 0.44]).is_normalized());
        assert!(Composition::new(vec![1.1, -0.1]).has_negative());
    }

    #[test]
    fn test_mean_molar_mass() {
        let composition = Composition::new(vec![0.5, 0.0, 0.5]);
        let mw = composition.mean_molar_mass(&amine_set()).unwrap();
        assert!((mw - (18.015 + 119.163) / 2.0).abs() < 1e-9);
    }
}
