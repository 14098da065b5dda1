//! Unit conversion between domain units and canonical SI.
//!
//! Domain-facing values are °C, kPa (absolute), kmol/h and kg/h. Everything
//! stored on a stream or sent to the engine is K, Pa, mol/s and kg/s.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const KELVIN_OFFSET: f64 = 273.15;
pub const ABSOLUTE_ZERO_C: f64 = -KELVIN_OFFSET;
pub const MAX_TEMPERATURE_C: f64 = 1000.0;
pub const PA_PER_KPA: f64 = 1000.0;
pub const SECONDS_PER_HOUR: f64 = 3600.0;

pub fn celsius_to_kelvin(c: f64) -> f64 {
    c + KELVIN_OFFSET
}

pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - KELVIN_OFFSET
}

pub fn kpa_to_pa(kpa: f64) -> f64 {
    kpa * PA_PER_KPA
}

pub fn pa_to_kpa(pa: f64) -> f64 {
    pa / PA_PER_KPA
}

pub fn kmol_per_h_to_mol_per_s(kmol_h: f64) -> f64 {
    kmol_h * 1000.0 / SECONDS_PER_HOUR
}

pub fn mol_per_s_to_kmol_per_h(mol_s: f64) -> f64 {
    mol_s * SECONDS_PER_HOUR / 1000.0
}

pub fn kg_per_h_to_kg_per_s(kg_h: f64) -> f64 {
    kg_h / SECONDS_PER_HOUR
}

pub fn kg_per_s_to_kg_per_h(kg_s: f64) -> f64 {
    kg_s * SECONDS_PER_HOUR
}

/// Gauge pressure in kg/cm²(g) to absolute kPa, as plant data sheets report it.
pub fn kgcm2g_to_kpa(p: f64) -> f64 {
    p * 98.0665 + 101.325
}

/// Properties of a stream's total phase in canonical SI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PhaseProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_k: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure_pa: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub molar_flow_mol_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_flow_kg_s: Option<f64>,
    /// Reported by the engine after a flash; never set by callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vapor_fraction: Option<f64>,
}

impl PhaseProperties {
    /// Overlay every value present in `other`, keeping the rest.
    pub fn merge(&mut self, other: &PhaseProperties) {
        if other.temperature_k.is_some() {
            self.temperature_k = other.temperature_k;
        }
        if other.pressure_pa.is_some() {
            self.pressure_pa = other.pressure_pa;
        }
        // The engine keeps one flow basis; writing one invalidates the other.
        if other.has_flow() {
            self.molar_flow_mol_s = other.molar_flow_mol_s;
            self.mass_flow_kg_s = other.mass_flow_kg_s;
        }
        if other.vapor_fraction.is_some() {
            self.vapor_fraction = other.vapor_fraction;
        }
    }

    pub fn has_flow(&self) -> bool {
        self.molar_flow_mol_s.is_some() || self.mass_flow_kg_s.is_some()
    }

    /// Whether temperature, pressure and a flow basis are all known.
    pub fn is_fully_specified(&self) -> bool {
        self.temperature_k.is_some() && self.pressure_pa.is_some() && self.has_flow()
    }

    pub fn to_domain(&self) -> StreamConditions {
        StreamConditions {
            temperature_c: self.temperature_k.map(kelvin_to_celsius),
            pressure_kpa: self.pressure_pa.map(pa_to_kpa),
            molar_flow_kmol_h: self.molar_flow_mol_s.map(mol_per_s_to_kmol_per_h),
            mass_flow_kg_h: self.mass_flow_kg_s.map(kg_per_s_to_kg_per_h),
        }
    }
}

/// Stream conditions as callers express them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StreamConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure_kpa: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub molar_flow_kmol_h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_flow_kg_h: Option<f64>,
}

impl StreamConditions {
    pub fn is_empty(&self) -> bool {
        self.temperature_c.is_none()
            && self.pressure_kpa.is_none()
            && self.molar_flow_kmol_h.is_none()
            && self.mass_flow_kg_h.is_none()
    }

    pub fn to_canonical(&self) -> PhaseProperties {
        PhaseProperties {
            temperature_k: self.temperature_c.map(celsius_to_kelvin),
            pressure_pa: self.pressure_kpa.map(kpa_to_pa),
            molar_flow_mol_s: self.molar_flow_kmol_h.map(kmol_per_h_to_mol_per_s),
            mass_flow_kg_s: self.mass_flow_kg_h.map(kg_per_h_to_kg_per_s),
            vapor_fraction: None,
        }
    }

    /// Short human-readable summary, e.g. `T=43°C, P=552kPa`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(t) = self.temperature_c {
            parts.push(format!("T={}°C", t));
        }
        if let Some(p) = self.pressure_kpa {
            parts.push(format!("P={}kPa", p));
        }
        if let Some(f) = self.molar_flow_kmol_h {
            parts.push(format!("F={}kmol/h", f));
        }
        if let Some(m) = self.mass_flow_kg_h {
            parts.push(format!("M={}kg/h", m));
        }
        parts.join(", ")
    }
}
