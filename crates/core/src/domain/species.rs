use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::CoreError;

/// Static data for one chemical species known to the alias table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeciesInfo {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// g/mol
    pub molar_mass: f64,
    /// Normal boiling point, K
    pub boiling_point_k: f64,
}

const SPECIES: &[SpeciesInfo] = &[
    SpeciesInfo { name: "Hydrogen", aliases: &["H2"], molar_mass: 2.016, boiling_point_k: 20.28 },
    SpeciesInfo { name: "Nitrogen", aliases: &["N2"], molar_mass: 28.014, boiling_point_k: 77.36 },
    SpeciesInfo { name: "Oxygen", aliases: &["O2"], molar_mass: 31.999, boiling_point_k: 90.19 },
    SpeciesInfo { name: "Carbon Monoxide", aliases: &["CO"], molar_mass: 28.010, boiling_point_k: 81.66 },
    SpeciesInfo { name: "Carbon Dioxide", aliases: &["CO2"], molar_mass: 44.010, boiling_point_k: 194.67 },
    SpeciesInfo { name: "Hydrogen Sulfide", aliases: &["H2S"], molar_mass: 34.081, boiling_point_k: 212.8 },
    SpeciesInfo { name: "Water", aliases: &["H2O"], molar_mass: 18.015, boiling_point_k: 373.15 },
    SpeciesInfo { name: "Methane", aliases: &["C1", "CH4"], molar_mass: 16.043, boiling_point_k: 111.66 },
    SpeciesInfo { name: "Ethane", aliases: &["C2", "C2H6"], molar_mass: 30.070, boiling_point_k: 184.55 },
    SpeciesInfo { name: "Ethylene", aliases: &["C2=", "Ethene"], molar_mass: 28.054, boiling_point_k: 169.4 },
    SpeciesInfo { name: "Propane", aliases: &["C3", "C3H8"], molar_mass: 44.097, boiling_point_k: 231.11 },
    SpeciesInfo { name: "Propylene", aliases: &["C3=", "Propene"], molar_mass: 42.081, boiling_point_k: 225.45 },
    SpeciesInfo { name: "n-Butane", aliases: &["nC4", "n-C4", "Butane"], molar_mass: 58.123, boiling_point_k: 272.65 },
    SpeciesInfo { name: "Isobutane", aliases: &["iC4", "i-C4", "i-Butane"], molar_mass: 58.123, boiling_point_k: 261.34 },
    SpeciesInfo { name: "n-Pentane", aliases: &["nC5", "n-C5", "Pentane"], molar_mass: 72.150, boiling_point_k: 309.22 },
    SpeciesInfo { name: "Isopentane", aliases: &["iC5", "i-C5", "i-Pentane"], molar_mass: 72.150, boiling_point_k: 300.99 },
    SpeciesInfo { name: "n-Hexane", aliases: &["nC6", "n-C6", "Hexane"], molar_mass: 86.177, boiling_point_k: 341.88 },
    SpeciesInfo { name: "n-Heptane", aliases: &["nC7", "n-C7", "Heptane"], molar_mass: 100.204, boiling_point_k: 371.58 },
    SpeciesInfo { name: "MDEA", aliases: &["Methyldiethanolamine"], molar_mass: 119.163, boiling_point_k: 520.15 },
    SpeciesInfo { name: "DEA", aliases: &["Diethanolamine"], molar_mass: 105.137, boiling_point_k: 541.54 },
    SpeciesInfo { name: "MEA", aliases: &["Monoethanolamine", "Ethanolamine"], molar_mass: 61.083, boiling_point_k: 443.15 },
];

/// Case-insensitive lookup by canonical name or alias.
pub fn lookup_species(name: &str) -> Option<&'static SpeciesInfo> {
    let needle = name.trim();
    SPECIES.iter().find(|s| {
        s.name.eq_ignore_ascii_case(needle) || s.aliases.iter().any(|a| a.eq_ignore_ascii_case(needle))
    })
}

/// A species name after alias resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedSpecies {
    pub name: String,
    /// False when the name was not in the alias table and passed through verbatim.
    pub verified: bool,
}

impl ResolvedSpecies {
    pub fn warning(&self) -> Option<String> {
        (!self.verified).then(|| {
            format!(
                "Species '{}' is not in the known alias table; passed through unverified",
                self.name
            )
        })
    }
}

pub fn resolve_species(name: &str) -> ResolvedSpecies {
    match lookup_species(name) {
        Some(info) => ResolvedSpecies {
            name: info.name.to_string(),
            verified: true,
        },
        None => ResolvedSpecies {
            name: name.trim().to_string(),
            verified: false,
        },
    }
}

/// Species registered with the engine environment, in registration order.
///
/// The order is significant: composition vectors are aligned positionally
/// with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ComponentSet(Vec<String>);

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Position of a species, matching canonical names and aliases case-insensitively.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        let canonical = resolve_species(name).name;
        self.0
            .iter()
            .position(|registered| registered.eq_ignore_ascii_case(&canonical))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn push(&mut self, name: impl Into<String>) -> Result<(), CoreError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(CoreError::DuplicateComponent(name));
        }
        self.0.push(name);
        Ok(())
    }

    pub fn molar_masses(&self) -> Result<Vec<f64>, CoreError> {
        self.0
            .iter()
            .map(|name| {
                lookup_species(name)
                    .map(|s| s.molar_mass)
                    .ok_or_else(|| CoreError::UnknownMolarMass(name.clone()))
            })
            .collect()
    }
}

impl FromIterator<String> for ComponentSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = ComponentSet::new();
        for name in iter {
            let _ = set.push(name);
        }
        set
    }
}
