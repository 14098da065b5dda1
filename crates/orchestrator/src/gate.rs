//! Engine-free validation of operations against the session's current
//! flowsheet. Nothing here performs I/O or mutates the session.

use std::collections::HashSet;

use chrono::Utc;
use procflow_core::units::{ABSOLUTE_ZERO_C, MAX_TEMPERATURE_C};
use procflow_core::{
    resolve_species, CompositionInput, CoreError, ResultField, Session, StreamConditions,
    StreamDirection, COMPOSITION_TOLERANCE,
};

use crate::error::{OrchestratorError, Result};
use crate::operation::{FailedComponent, Operation, SpeciesList, ValidatedOperation};

pub struct ValidationGate;

impl ValidationGate {
    pub fn validate(session: &Session, operation: &Operation) -> Result<ValidatedOperation> {
        match operation {
            Operation::CreateProject => Ok(ValidatedOperation::CreateProject),
            Operation::AddFlowsheet { name } => Ok(ValidatedOperation::AddFlowsheet {
                name: non_empty("flowsheet name", name)?,
            }),
            Operation::AddComponents { components } => Self::components(session, components),
            Operation::CreateBlock { kind, name } => Ok(ValidatedOperation::CreateBlock {
                name: Self::new_name(session, name)?,
                kind: *kind,
            }),
            Operation::CreateStream { name } => Ok(ValidatedOperation::CreateStream {
                name: Self::new_name(session, name)?,
            }),
            Operation::ConnectStream {
                stream,
                block,
                direction,
                port,
            } => Self::connection(session, stream, block, *direction, *port),
            Operation::SetStreamProperties { stream, .. } => {
                let (stream, stream_id) = Self::existing_stream(session, stream)?;
                let conditions = Self::conditions(operation)?;
                Ok(ValidatedOperation::SetStreamProperties {
                    stream,
                    stream_id,
                    conditions,
                })
            }
            Operation::AdjustParameters { stream, .. } => {
                let (stream, stream_id) = Self::existing_stream(session, stream)?;
                let conditions = Self::conditions(operation)?;
                Ok(ValidatedOperation::AdjustParameters {
                    stream,
                    stream_id,
                    conditions,
                })
            }
            Operation::SetStreamComposition {
                stream,
                composition,
            } => Self::composition(session, stream, composition),
            Operation::FlashStream { stream } => {
                let (stream, stream_id) = Self::existing_stream(session, stream)?;
                Ok(ValidatedOperation::FlashStream { stream, stream_id })
            }
            Operation::RunSimulation => Ok(ValidatedOperation::RunSimulation),
            Operation::GetResults {
                streams,
                properties,
            } => {
                let streams = if streams.is_empty() {
                    session
                        .streams
                        .iter()
                        .map(|s| (s.name.clone(), s.engine_id.clone()))
                        .collect()
                } else {
                    streams
                        .iter()
                        .map(|name| Self::existing_stream(session, name))
                        .collect::<Result<Vec<_>>>()?
                };
                let fields = if properties.is_empty() {
                    ResultField::ALL.to_vec()
                } else {
                    properties.clone()
                };
                Ok(ValidatedOperation::GetResults { streams, fields })
            }
            Operation::SaveProject { path } => {
                let path = match path {
                    Some(p) if p.is_absolute() => p.clone(),
                    Some(p) => session.working_dir().join(p),
                    None => session.default_project_path(Utc::now()),
                };
                Ok(ValidatedOperation::SaveProject { path })
            }
            Operation::ListComponents => Ok(ValidatedOperation::ListComponents),
            Operation::ListStreams => Ok(ValidatedOperation::ListStreams),
            Operation::CloseProject => Ok(ValidatedOperation::CloseProject),
        }
    }

    fn components(session: &Session, components: &SpeciesList) -> Result<ValidatedOperation> {
        let names = components.names();
        if names.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "add_components needs at least one species".to_string(),
            ));
        }

        let mut requested = Vec::new();
        let mut failed = Vec::new();
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();
        for name in names {
            let resolved = resolve_species(&name);
            let key = resolved.name.to_ascii_lowercase();
            if session.components.contains(&resolved.name) {
                failed.push(FailedComponent {
                    name,
                    reason: "already registered".to_string(),
                });
                continue;
            }
            if !seen.insert(key) {
                failed.push(FailedComponent {
                    name,
                    reason: "listed more than once".to_string(),
                });
                continue;
            }
            warnings.extend(resolved.warning());
            requested.push(resolved.name);
        }

        Ok(ValidatedOperation::AddComponents {
            requested,
            failed,
            warnings,
        })
    }

    fn new_name(session: &Session, name: &str) -> Result<String> {
        let name = non_empty("name", name)?;
        if session.name_taken(&name) {
            return Err(OrchestratorError::DuplicateName(name));
        }
        Ok(name)
    }

    fn existing_stream(session: &Session, name: &str) -> Result<(String, String)> {
        session
            .stream(name)
            .map(|s| (s.name.clone(), s.engine_id.clone()))
            .ok_or_else(|| OrchestratorError::UnknownStream(name.to_string()))
    }

    fn connection(
        session: &Session,
        stream: &str,
        block: &str,
        direction: StreamDirection,
        port: u32,
    ) -> Result<ValidatedOperation> {
        let s = session
            .stream(stream)
            .ok_or_else(|| OrchestratorError::UnknownStream(stream.to_string()))?;
        let b = session
            .block(block)
            .ok_or_else(|| OrchestratorError::UnknownBlock(block.to_string()))?;

        let role = direction.port_role();
        if b.port(role, port).is_none() {
            return Err(OrchestratorError::illegal_connection(
                block,
                port,
                format!(
                    "{} '{}' has {} {} port(s), numbered from 1",
                    b.kind,
                    block,
                    b.port_count(role),
                    role.as_str()
                ),
            ));
        }

        let end = direction.glued_end();
        if let Some(existing) = s.endpoint(end) {
            return Err(OrchestratorError::illegal_connection(
                block,
                port,
                format!(
                    "stream '{}' {} end is already glued to {} port {}",
                    stream,
                    end.as_str(),
                    existing.block,
                    existing.port
                ),
            ));
        }
        let occupied = session.streams.iter().find(|other| {
            other
                .endpoint(end)
                .is_some_and(|e| e.block == block && e.port == port)
        });
        if let Some(other) = occupied {
            return Err(OrchestratorError::illegal_connection(
                block,
                port,
                format!("{} port already taken by stream '{}'", role.as_str(), other.name),
            ));
        }

        Ok(ValidatedOperation::ConnectStream {
            stream: s.name.clone(),
            stream_id: s.engine_id.clone(),
            block: b.name.clone(),
            block_id: b.engine_id.clone(),
            direction,
            port,
        })
    }

    fn conditions(operation: &Operation) -> Result<StreamConditions> {
        let conditions = operation.conditions().unwrap_or_default();
        if conditions.is_empty() {
            return Err(OrchestratorError::InvalidRequest(format!(
                "{} needs at least one of temperature_c, pressure_kpa, molar_flow_kmol_h, mass_flow_kg_h",
                operation.name()
            )));
        }
        check_properties(&conditions)?;
        Ok(conditions)
    }

    fn composition(
        session: &Session,
        stream: &str,
        input: &CompositionInput,
    ) -> Result<ValidatedOperation> {
        let (stream, stream_id) = Self::existing_stream(session, stream)?;
        if session.components.is_empty() {
            return Err(OrchestratorError::composition(
                0.0,
                "no components are registered",
            ));
        }

        let composition = input.align(&session.components).map_err(|e| match e {
            CoreError::UnregisteredSpecies(species) => OrchestratorError::composition(
                0.0,
                format!("species '{}' is not in the component set", species),
            ),
            other => OrchestratorError::composition(0.0, other.to_string()),
        })?;

        let sum = composition.sum();
        if composition.len() != session.components.len() {
            return Err(OrchestratorError::composition(
                sum,
                format!(
                    "expected {} values, got {}",
                    session.components.len(),
                    composition.len()
                ),
            ));
        }
        if composition.fractions().iter().any(|x| !x.is_finite()) {
            return Err(OrchestratorError::composition(sum, "non-finite fraction"));
        }
        if composition.has_negative() {
            return Err(OrchestratorError::composition(sum, "negative fraction"));
        }
        if (sum - 1.0).abs() > COMPOSITION_TOLERANCE {
            return Err(OrchestratorError::composition(
                sum,
                format!("fractions must sum to 1 within {}", COMPOSITION_TOLERANCE),
            ));
        }

        Ok(ValidatedOperation::SetStreamComposition {
            stream,
            stream_id,
            composition,
        })
    }
}

/// Physical plausibility of caller-supplied stream conditions.
pub fn check_properties(conditions: &StreamConditions) -> Result<()> {
    if let Some(t) = conditions.temperature_c {
        if !(ABSOLUTE_ZERO_C..=MAX_TEMPERATURE_C).contains(&t) {
            return Err(OrchestratorError::out_of_range("temperature_c", t));
        }
    }
    if let Some(p) = conditions.pressure_kpa {
        if p.is_nan() || p <= 0.0 || p.is_infinite() {
            return Err(OrchestratorError::out_of_range("pressure_kpa", p));
        }
    }
    for (field, value) in [
        ("molar_flow_kmol_h", conditions.molar_flow_kmol_h),
        ("mass_flow_kg_h", conditions.mass_flow_kg_h),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(OrchestratorError::out_of_range(field, v));
            }
        }
    }
    Ok(())
}

fn non_empty(what: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(OrchestratorError::InvalidRequest(format!(
            "{} must not be empty",
            what
        )))
    } else {
        Ok(trimmed.to_string())
    }
}
