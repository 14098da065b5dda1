//! Deterministic in-process engine for offline demos and tests.
//!
//! Models just enough process behavior to exercise the orchestration:
//! a boiling-point flash, an amine absorber for column blocks, a boiling
//! point split for separators, mixers, splitters and pass-through units.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use procflow_core::{lookup_species, BlockKind, PortRole, StencilRef, StreamEnd};
use serde::Serialize;

use super::{
    EngineBackend, EngineFault, EngineResult, PhaseProp, StreamReadout, MOLAR_FRACTION_BASIS,
    TOTAL_PHASE,
};

/// Equilibrium slope of H2S over loaded amine, mol/mol gas per mol/mol loading.
const H2S_EQUILIBRIUM: f64 = 0.01;
/// Mass-transfer steepness of the absorber in amine-to-gas molar ratio.
const ABSORBER_STAGES: f64 = 3.0;
const AMINES: [&str; 3] = ["MDEA", "DEA", "MEA"];

#[derive(Debug, Clone, Default, Serialize)]
struct SimStream {
    name: String,
    temperature_k: Option<f64>,
    pressure_pa: Option<f64>,
    molar_flow_mol_s: Option<f64>,
    mass_flow_kg_s: Option<f64>,
    vapor_fraction: Option<f64>,
    fractions: Option<Vec<f64>>,
    flashed: bool,
}

#[derive(Debug, Clone, Serialize)]
struct SimBlock {
    name: String,
    master: String,
    inlets: BTreeMap<u32, String>,
    outlets: BTreeMap<u32, String>,
}

#[derive(Debug, Default, Serialize)]
struct EngineState {
    project_open: bool,
    flowsheet: Option<String>,
    components: Vec<String>,
    blocks: BTreeMap<String, SimBlock>,
    streams: BTreeMap<String, SimStream>,
    #[serde(skip)]
    block_counters: HashMap<String, u32>,
}

/// Component molar flows with conditions; the unit of the block models.
#[derive(Debug, Clone)]
struct Material {
    moles: Vec<f64>,
    temperature_k: f64,
    pressure_pa: f64,
}

impl Material {
    fn total(&self) -> f64 {
        self.moles.iter().sum()
    }

    fn fraction(&self, index: usize) -> f64 {
        let total = self.total();
        if total > 0.0 {
            self.moles[index] / total
        } else {
            0.0
        }
    }
}

/// Master name of the process stream tool in the engine window.
pub const STREAM_MASTER: &str = "Stream";

pub struct SimulatedEngine {
    state: Mutex<EngineState>,
    faults: Mutex<HashMap<String, VecDeque<EngineFault>>>,
    calls: Mutex<Vec<String>>,
    unsupported_masters: HashSet<&'static str>,
    latency: Option<Duration>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            unsupported_masters: HashSet::new(),
            latency: None,
        }
    }

    /// Block kinds the command interface refuses with an unsupported fault.
    /// Column kinds share one shape, so marking either marks both.
    pub fn with_unsupported_kinds(mut self, kinds: &[BlockKind]) -> Self {
        self.unsupported_masters = kinds.iter().map(|k| k.stencil().master).collect();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a fault returned by the next call of `command`.
    pub fn inject_fault(&self, command: &str, fault: EngineFault) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.entry(command.to_string()).or_default().push_back(fault);
        }
    }

    /// Commands received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == command).count()
    }

    /// Shape dropped and named through the engine window rather than the
    /// command interface. The name doubles as the engine id.
    pub fn place_shape(&self, master: &str, name: &str) -> EngineResult<()> {
        self.with_state(|state| {
            require_project(state)?;
            if master == STREAM_MASTER {
                state.streams.insert(
                    name.to_string(),
                    SimStream {
                        name: name.to_string(),
                        ..Default::default()
                    },
                );
            } else {
                state.blocks.insert(
                    name.to_string(),
                    SimBlock {
                        name: name.to_string(),
                        master: master.to_string(),
                        inlets: BTreeMap::new(),
                        outlets: BTreeMap::new(),
                    },
                );
            }
            Ok(())
        })
    }

    pub async fn write_snapshot(&self, path: &Path) -> EngineResult<()> {
        let snapshot = self.with_state(|state| {
            require_project(state)?;
            serde_json::to_vec_pretty(&*state)
                .map_err(|e| EngineFault::rejected(500, e.to_string()))
        })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineFault::rejected(500, e.to_string()))?;
        }
        tokio::fs::write(path, snapshot)
            .await
            .map_err(|e| EngineFault::rejected(500, e.to_string()))
    }

    async fn enter(&self, command: &str) -> EngineResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.to_string());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .faults
            .lock()
            .ok()
            .and_then(|mut f| f.get_mut(command).and_then(VecDeque::pop_front));
        match injected {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut EngineState) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| EngineFault::disconnected("engine state poisoned"))?;
        f(&mut state)
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn require_project(state: &EngineState) -> EngineResult<()> {
    if state.project_open {
        Ok(())
    } else {
        Err(EngineFault::rejected(1, "no project is open"))
    }
}

fn stream_mut<'a>(state: &'a mut EngineState, id: &str) -> EngineResult<&'a mut SimStream> {
    state
        .streams
        .get_mut(id)
        .ok_or_else(|| EngineFault::rejected(404, format!("stream '{}' not found", id)))
}

fn molar_masses(components: &[String]) -> Vec<f64> {
    components
        .iter()
        .map(|c| lookup_species(c).map(|s| s.molar_mass).unwrap_or(100.0))
        .collect()
}

fn boiling_points(components: &[String]) -> Vec<f64> {
    components
        .iter()
        .map(|c| lookup_species(c).map(|s| s.boiling_point_k).unwrap_or(400.0))
        .collect()
}

/// kg/mol for the given mole fractions.
fn mean_molar_mass(fractions: &[f64], masses: &[f64]) -> f64 {
    fractions.iter().zip(masses).map(|(x, m)| x * m).sum::<f64>() / 1000.0
}

fn vapor_fraction(fractions: &[f64], boiling: &[f64], temperature_k: f64) -> f64 {
    fractions
        .iter()
        .zip(boiling)
        .filter(|(_, tb)| **tb < temperature_k)
        .map(|(x, _)| *x)
        .sum()
}

fn material_of(stream: &SimStream) -> Option<Material> {
    let fractions = stream.fractions.as_ref()?;
    let total = stream.molar_flow_mol_s?;
    Some(Material {
        moles: fractions.iter().map(|x| x * total).collect(),
        temperature_k: stream.temperature_k?,
        pressure_pa: stream.pressure_pa?,
    })
}

fn store_material(stream: &mut SimStream, material: &Material, components: &[String]) {
    let masses = molar_masses(components);
    let boiling = boiling_points(components);
    let total = material.total();
    let fractions: Vec<f64> = (0..material.moles.len())
        .map(|i| material.fraction(i))
        .collect();

    stream.temperature_k = Some(material.temperature_k);
    stream.pressure_pa = Some(material.pressure_pa);
    stream.molar_flow_mol_s = Some(total);
    stream.mass_flow_kg_s = Some(total * mean_molar_mass(&fractions, &masses));
    stream.vapor_fraction = Some(vapor_fraction(&fractions, &boiling, material.temperature_k));
    stream.fractions = Some(fractions);
    stream.flashed = true;
}

fn mix(inputs: &[Material]) -> Option<Material> {
    let first = inputs.first()?;
    let mut moles = vec![0.0; first.moles.len()];
    let mut weighted_t = 0.0;
    for input in inputs {
        for (acc, n) in moles.iter_mut().zip(&input.moles) {
            *acc += n;
        }
        weighted_t += input.temperature_k * input.total();
    }
    let total: f64 = moles.iter().sum();
    Some(Material {
        moles,
        temperature_k: if total > 0.0 {
            weighted_t / total
        } else {
            first.temperature_k
        },
        pressure_pa: inputs
            .iter()
            .map(|m| m.pressure_pa)
            .fold(f64::INFINITY, f64::min),
    })
}

/// Split by boiling point at the feed temperature: (vapor, liquid).
fn split_by_volatility(feed: &Material, boiling: &[f64]) -> (Material, Material) {
    let mut vapor = feed.clone();
    let mut liquid = feed.clone();
    for (i, tb) in boiling.iter().enumerate() {
        if *tb < feed.temperature_k {
            liquid.moles[i] = 0.0;
        } else {
            vapor.moles[i] = 0.0;
        }
    }
    (vapor, liquid)
}

/// Counter-current amine absorber: (overhead gas, rich solvent).
fn absorb(gas: &Material, solvent: &Material, amine: usize, h2s: Option<usize>) -> (Material, Material) {
    let gas_total = gas.total();
    let amine_flow = solvent.moles[amine];
    let mut overhead = gas.clone();
    let mut bottoms = solvent.clone();
    overhead.temperature_k = solvent.temperature_k;
    overhead.pressure_pa = gas.pressure_pa;

    if let Some(h2s) = h2s {
        if gas_total > 0.0 && amine_flow > 0.0 {
            let y_in = gas.moles[h2s] / gas_total;
            let lean_loading = solvent.moles[h2s] / amine_flow;
            let pickup = gas.moles[h2s] / amine_flow;
            let slip = y_in * (-ABSORBER_STAGES * amine_flow / gas_total).exp();
            let y_out = (H2S_EQUILIBRIUM * (lean_loading + pickup) + slip).min(y_in);
            let absorbed = gas_total * (y_in - y_out) / (1.0 - y_out);
            overhead.moles[h2s] -= absorbed;
            bottoms.moles[h2s] += absorbed;
        }
    }

    let total = gas_total + solvent.total();
    if total > 0.0 {
        bottoms.temperature_k =
            (gas.temperature_k * gas_total + solvent.temperature_k * solvent.total()) / total;
    }
    (overhead, bottoms)
}

fn run_block(
    block: &SimBlock,
    inputs: &[Material],
    components: &[String],
) -> BTreeMap<u32, Material> {
    let boiling = boiling_points(components);
    let mut outputs = BTreeMap::new();
    let Some(combined) = mix(inputs) else {
        return outputs;
    };
    let amine = components
        .iter()
        .position(|c| AMINES.iter().any(|a| a.eq_ignore_ascii_case(c)));
    let h2s = components
        .iter()
        .position(|c| c.eq_ignore_ascii_case("Hydrogen Sulfide"));

    match block.master.as_str() {
        "Distill" => {
            let solvent_index = amine.and_then(|a| {
                inputs
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.fraction(a) > 0.0)
                    .max_by(|(_, x), (_, y)| x.fraction(a).total_cmp(&y.fraction(a)))
                    .map(|(i, _)| i)
            });
            match (amine, solvent_index) {
                (Some(amine), Some(si)) if inputs.len() > 1 => {
                    let gas: Vec<Material> = inputs
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != si)
                        .map(|(_, m)| m.clone())
                        .collect();
                    if let Some(gas) = mix(&gas) {
                        let (overhead, bottoms) = absorb(&gas, &inputs[si], amine, h2s);
                        outputs.insert(1, overhead);
                        outputs.insert(2, bottoms);
                    }
                }
                _ => {
                    let (vapor, liquid) = split_by_volatility(&combined, &boiling);
                    outputs.insert(1, vapor);
                    outputs.insert(2, liquid);
                }
            }
        }
        "2 Phase Separator" => {
            let (vapor, liquid) = split_by_volatility(&combined, &boiling);
            outputs.insert(1, vapor);
            outputs.insert(2, liquid);
        }
        "Splitter" => {
            let share = 1.0 / block.outlets.len().max(1) as f64;
            for port in block.outlets.keys() {
                let mut part = combined.clone();
                part.moles.iter_mut().for_each(|n| *n *= share);
                outputs.insert(*port, part);
            }
        }
        _ if inputs.len() == block.outlets.len() => {
            for (port, input) in block.outlets.keys().zip(inputs) {
                outputs.insert(*port, input.clone());
            }
        }
        _ => {
            if let Some(port) = block.outlets.keys().next() {
                outputs.insert(*port, combined);
            }
        }
    }
    outputs
}

#[async_trait]
impl EngineBackend for SimulatedEngine {
    async fn new_project(&self) -> EngineResult<()> {
        self.enter("new_project").await?;
        self.with_state(|state| {
            *state = EngineState {
                project_open: true,
                ..Default::default()
            };
            Ok(())
        })
    }

    async fn add_flowsheet(&self, name: &str) -> EngineResult<String> {
        self.enter("add_flowsheet").await?;
        self.with_state(|state| {
            require_project(state)?;
            state.flowsheet = Some(name.to_string());
            Ok(name.to_string())
        })
    }

    async fn add_component(&self, name: &str) -> EngineResult<()> {
        self.enter("add_component").await?;
        self.with_state(|state| {
            require_project(state)?;
            let info = lookup_species(name).ok_or_else(|| {
                EngineFault::rejected(404, format!("'{}' not found in the component database", name))
            })?;
            if state.components.iter().any(|c| c == info.name) {
                return Err(EngineFault::rejected(409, format!("'{}' already registered", name)));
            }
            state.components.push(info.name.to_string());
            Ok(())
        })
    }

    async fn environment_components(&self) -> EngineResult<Vec<String>> {
        self.enter("environment_components").await?;
        self.with_state(|state| Ok(state.components.clone()))
    }

    async fn add_block(&self, stencil: StencilRef, name: &str) -> EngineResult<String> {
        self.enter("add_block").await?;
        if self.unsupported_masters.contains(stencil.master) {
            return Err(EngineFault::unsupported(format!(
                "master '{}' from {} cannot be placed through the command interface",
                stencil.master, stencil.stencil
            )));
        }
        self.with_state(|state| {
            require_project(state)?;
            let id = if stencil.master == "Distill" {
                let counter = state.block_counters.entry(stencil.master.to_string()).or_insert(99);
                *counter += 1;
                format!("DTWR-{}", counter)
            } else {
                name.to_string()
            };
            state.blocks.insert(
                id.clone(),
                SimBlock {
                    name: name.to_string(),
                    master: stencil.master.to_string(),
                    inlets: BTreeMap::new(),
                    outlets: BTreeMap::new(),
                },
            );
            Ok(id)
        })
    }

    async fn add_stream(&self, name: &str) -> EngineResult<String> {
        self.enter("add_stream").await?;
        self.with_state(|state| {
            require_project(state)?;
            state.streams.insert(
                name.to_string(),
                SimStream {
                    name: name.to_string(),
                    ..Default::default()
                },
            );
            Ok(name.to_string())
        })
    }

    async fn glue(
        &self,
        stream_id: &str,
        end: StreamEnd,
        block_id: &str,
        role: PortRole,
        port: u32,
    ) -> EngineResult<()> {
        self.enter("glue").await?;
        self.with_state(|state| {
            stream_mut(state, stream_id)?;
            let expected = match role {
                PortRole::Inlet => StreamEnd::Downstream,
                PortRole::Outlet => StreamEnd::Upstream,
            };
            if end != expected || port == 0 {
                return Err(EngineFault::rejected(
                    422,
                    format!("cannot glue {:?} end to {} port {}", end, role.as_str(), port),
                ));
            }
            let block = state
                .blocks
                .get_mut(block_id)
                .ok_or_else(|| EngineFault::rejected(404, format!("block '{}' not found", block_id)))?;
            let ports = match role {
                PortRole::Inlet => &mut block.inlets,
                PortRole::Outlet => &mut block.outlets,
            };
            ports.insert(port, stream_id.to_string());
            Ok(())
        })
    }

    async fn set_phase_property(
        &self,
        stream_id: &str,
        phase: i32,
        property: PhaseProp,
        value: f64,
    ) -> EngineResult<()> {
        self.enter("set_phase_property").await?;
        self.with_state(|state| {
            if phase != TOTAL_PHASE {
                return Err(EngineFault::rejected(422, format!("phase {} is read-only", phase)));
            }
            let stream = stream_mut(state, stream_id)?;
            match property {
                PhaseProp::Temperature => stream.temperature_k = Some(value),
                PhaseProp::Pressure => stream.pressure_pa = Some(value),
                PhaseProp::MolarFlow => {
                    stream.molar_flow_mol_s = Some(value);
                    stream.mass_flow_kg_s = None;
                }
                PhaseProp::MassFlow => {
                    stream.mass_flow_kg_s = Some(value);
                    stream.molar_flow_mol_s = None;
                }
            }
            stream.flashed = false;
            stream.vapor_fraction = None;
            Ok(())
        })
    }

    async fn set_composition(
        &self,
        stream_id: &str,
        phase: i32,
        basis: i32,
        values: &[f64],
    ) -> EngineResult<()> {
        self.enter("set_composition").await?;
        self.with_state(|state| {
            if phase != TOTAL_PHASE || basis != MOLAR_FRACTION_BASIS {
                return Err(EngineFault::rejected(
                    422,
                    format!("unsupported phase {} / basis {}", phase, basis),
                ));
            }
            let expected = state.components.len();
            if values.len() != expected {
                return Err(EngineFault::rejected(
                    422,
                    format!("expected {} values, got {}", expected, values.len()),
                ));
            }
            let stream = stream_mut(state, stream_id)?;
            stream.fractions = Some(values.to_vec());
            stream.flashed = false;
            stream.vapor_fraction = None;
            Ok(())
        })
    }

    async fn flash(&self, stream_id: &str) -> EngineResult<()> {
        self.enter("flash").await?;
        self.with_state(|state| {
            let masses = molar_masses(&state.components);
            let boiling = boiling_points(&state.components);
            let stream = stream_mut(state, stream_id)?;
            let (Some(t), Some(_), Some(fractions)) = (
                stream.temperature_k,
                stream.pressure_pa,
                stream.fractions.clone(),
            ) else {
                return Err(EngineFault::rejected(
                    422,
                    format!("stream '{}' is underspecified", stream_id),
                ));
            };
            let mw = mean_molar_mass(&fractions, &masses);
            match (stream.molar_flow_mol_s, stream.mass_flow_kg_s) {
                (Some(molar), _) => stream.mass_flow_kg_s = Some(molar * mw),
                (None, Some(mass)) if mw > 0.0 => stream.molar_flow_mol_s = Some(mass / mw),
                _ => {
                    return Err(EngineFault::rejected(
                        422,
                        format!("stream '{}' has no flow", stream_id),
                    ))
                }
            }
            stream.vapor_fraction = Some(vapor_fraction(&fractions, &boiling, t));
            stream.flashed = true;
            Ok(())
        })
    }

    async fn solve(&self) -> EngineResult<i32> {
        self.enter("solve").await?;
        self.with_state(|state| {
            let components = state.components.clone();
            let produced: HashSet<String> = state
                .blocks
                .values()
                .flat_map(|b| b.outlets.values().cloned())
                .collect();
            let mut known: HashSet<String> = state
                .streams
                .iter()
                .filter(|(id, s)| s.flashed && !produced.contains(*id))
                .map(|(id, _)| id.clone())
                .collect();
            let mut pending: Vec<String> = state.blocks.keys().cloned().collect();

            loop {
                let ready = pending.iter().position(|id| {
                    state.blocks.get(id).is_some_and(|b| {
                        !b.inlets.is_empty() && b.inlets.values().all(|s| known.contains(s))
                    })
                });
                let Some(index) = ready else { break };
                let block_id = pending.remove(index);
                let Some(block) = state.blocks.get(&block_id).cloned() else {
                    continue;
                };

                let inputs: Vec<Material> = block
                    .inlets
                    .values()
                    .filter_map(|s| state.streams.get(s).and_then(material_of))
                    .collect();
                if inputs.len() != block.inlets.len() {
                    return Ok(0);
                }
                for (port, material) in run_block(&block, &inputs, &components) {
                    if let Some(stream_id) = block.outlets.get(&port) {
                        if let Some(stream) = state.streams.get_mut(stream_id) {
                            store_material(stream, &material, &components);
                            known.insert(stream_id.clone());
                        }
                    }
                }
            }

            Ok(if pending.is_empty() && !state.blocks.is_empty() {
                1
            } else {
                0
            })
        })
    }

    async fn read_stream(&self, stream_id: &str) -> EngineResult<StreamReadout> {
        self.enter("read_stream").await?;
        self.with_state(|state| {
            let stream = stream_mut(state, stream_id)?;
            Ok(StreamReadout {
                temperature_k: stream.temperature_k,
                pressure_pa: stream.pressure_pa,
                molar_flow_mol_s: stream.molar_flow_mol_s,
                mass_flow_kg_s: stream.mass_flow_kg_s,
                vapor_fraction: stream.vapor_fraction,
                mole_fractions: stream.fractions.clone().unwrap_or_default(),
            })
        })
    }

    async fn list_streams(&self) -> EngineResult<Vec<String>> {
        self.enter("list_streams").await?;
        self.with_state(|state| Ok(state.streams.values().map(|s| s.name.clone()).collect()))
    }

    async fn save_as(&self, path: &Path) -> EngineResult<()> {
        self.enter("save_as").await?;
        self.write_snapshot(path).await
    }

    async fn close(&self) -> EngineResult<()> {
        self.enter("close").await?;
        self.with_state(|state| {
            *state = EngineState::default();
            Ok(())
        })
    }
}

impl std::fmt::Debug for SimulatedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedEngine")
            .field("unsupported_masters", &self.unsupported_masters)
            .field("latency", &self.latency)
            .finish()
    }
}
