use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use procflow_core::{
    ComponentSet, Composition, PhaseProperties, ResultField, Session, SimulationOutcome, StreamConditions,
    StreamResults,
};
use thiserror::Error;
use tracing::debug;

use super::{
    is_converged, EngineBackend, EngineFault, EngineResult, FaultClass, PhaseProp,
    StreamReadout, MOLAR_FRACTION_BASIS, TOTAL_PHASE,
};
use crate::operation::{FailedComponent, OperationOutput, ValidatedOperation};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    #[error("{command}: {fault}")]
    Fault {
        command: &'static str,
        fault: EngineFault,
    },

    #[error("{command} timed out after {after_ms}ms")]
    Timeout { command: &'static str, after_ms: u64 },
}

impl AdapterError {
    pub fn class(&self) -> Option<FaultClass> {
        match self {
            Self::Fault { fault, .. } => Some(fault.class),
            Self::Timeout { .. } => None,
        }
    }
}

/// Normalized success envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message: String,
    pub output: OperationOutput,
}

impl Reply {
    fn new(message: impl Into<String>, output: OperationOutput) -> Self {
        Self {
            message: message.into(),
            output,
        }
    }
}

/// Translates validated domain operations into engine commands.
///
/// Converts domain units to SI, looks up block stencils, and fixes the glue
/// direction: inlet streams attach their downstream end, outlet streams their
/// upstream end. Every engine call carries the configured timeout.
pub struct PrimaryAdapter {
    engine: Arc<dyn EngineBackend>,
    call_timeout: Duration,
}

impl PrimaryAdapter {
    pub fn new(engine: Arc<dyn EngineBackend>, call_timeout: Duration) -> Self {
        Self {
            engine,
            call_timeout,
        }
    }

    async fn call<T, F>(&self, command: &'static str, fut: F) -> Result<T, AdapterError>
    where
        F: Future<Output = EngineResult<T>>,
    {
        debug!(command, "Engine call");
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(fault)) => Err(AdapterError::Fault { command, fault }),
            Err(_) => Err(AdapterError::Timeout {
                command,
                after_ms: self.call_timeout.as_millis() as u64,
            }),
        }
    }

    pub async fn execute(
        &self,
        session: &Session,
        op: &ValidatedOperation,
    ) -> Result<Reply, AdapterError> {
        let engine = &self.engine;
        match op {
            ValidatedOperation::CreateProject => {
                self.call("new_project", engine.new_project()).await?;
                Ok(Reply::new(
                    "Project created",
                    OperationOutput::ProjectCreated {
                        session_id: session.id,
                    },
                ))
            }

            ValidatedOperation::AddFlowsheet { name } => {
                let flowsheet_id = self.call("add_flowsheet", engine.add_flowsheet(name)).await?;
                Ok(Reply::new(
                    format!("Flowsheet '{}' created", name),
                    OperationOutput::FlowsheetCreated {
                        name: name.clone(),
                        flowsheet_id,
                    },
                ))
            }

            ValidatedOperation::AddComponents {
                requested, failed, ..
            } => self.add_components(requested, failed).await,

            ValidatedOperation::CreateBlock { name, kind } => {
                let engine_id = self
                    .call("add_block", engine.add_block(kind.stencil(), name))
                    .await?;
                Ok(Reply::new(
                    format!("Block '{}' created as {}", name, engine_id),
                    OperationOutput::BlockCreated {
                        name: name.clone(),
                        kind: *kind,
                        engine_id,
                    },
                ))
            }

            ValidatedOperation::CreateStream { name } => {
                let stream_id = self.call("add_stream", engine.add_stream(name)).await?;
                Ok(Reply::new(
                    format!("Stream '{}' created", name),
                    OperationOutput::StreamCreated {
                        name: name.clone(),
                        stream_id,
                    },
                ))
            }

            ValidatedOperation::ConnectStream {
                stream,
                stream_id,
                block,
                block_id,
                direction,
                port,
            } => {
                let end = direction.glued_end();
                self.call(
                    "glue",
                    engine.glue(stream_id, end, block_id, direction.port_role(), *port),
                )
                .await?;
                Ok(Reply::new(
                    format!(
                        "Stream '{}' connected to {} port {} of '{}'",
                        stream,
                        direction.as_str(),
                        port,
                        block
                    ),
                    OperationOutput::StreamConnected {
                        stream: stream.clone(),
                        block: block.clone(),
                        port: *port,
                        end,
                    },
                ))
            }

            ValidatedOperation::SetStreamProperties {
                stream,
                stream_id,
                conditions,
            } => {
                let properties = self.write_properties(stream_id, conditions).await?;
                Ok(Reply::new(
                    format!("Properties set on '{}': {}", stream, conditions.describe()),
                    OperationOutput::PropertiesSet {
                        stream: stream.clone(),
                        properties,
                    },
                ))
            }

            ValidatedOperation::AdjustParameters {
                stream,
                stream_id,
                conditions,
            } => {
                let properties = self.write_properties(stream_id, conditions).await?;
                Ok(Reply::new(
                    format!("Adjusted '{}': {}", stream, conditions.describe()),
                    OperationOutput::ParametersAdjusted {
                        stream: stream.clone(),
                        properties,
                    },
                ))
            }

            ValidatedOperation::SetStreamComposition {
                stream,
                stream_id,
                composition,
            } => {
                self.call(
                    "set_composition",
                    engine.set_composition(
                        stream_id,
                        TOTAL_PHASE,
                        MOLAR_FRACTION_BASIS,
                        composition.fractions(),
                    ),
                )
                .await?;
                let sum = composition.sum();
                Ok(Reply::new(
                    format!(
                        "Composition set on '{}' ({} components, sum {:.4})",
                        stream,
                        composition.len(),
                        sum
                    ),
                    OperationOutput::CompositionSet {
                        stream: stream.clone(),
                        composition: composition.clone(),
                        fractions: composition.to_map(&session.components),
                        sum,
                    },
                ))
            }

            ValidatedOperation::FlashStream { stream, stream_id } => {
                self.call("flash", engine.flash(stream_id)).await?;
                let readout = self.call("read_stream", engine.read_stream(stream_id)).await?;
                let properties = readout_properties(&readout);
                Ok(Reply::new(
                    format!(
                        "Stream '{}' flashed (vapor fraction {})",
                        stream,
                        properties
                            .vapor_fraction
                            .map(|v| format!("{:.4}", v))
                            .unwrap_or_else(|| "n/a".to_string())
                    ),
                    OperationOutput::StreamFlashed {
                        stream: stream.clone(),
                        properties,
                    },
                ))
            }

            ValidatedOperation::RunSimulation => {
                let status_code = self.call("solve", engine.solve()).await?;
                let converged = is_converged(status_code);
                let diagnostics = if converged {
                    Vec::new()
                } else {
                    vec![
                        format!("Solver returned status {}", status_code),
                        "Check that every block inlet is connected to a flashed feed stream"
                            .to_string(),
                    ]
                };
                Ok(Reply::new(
                    if converged {
                        "Simulation converged".to_string()
                    } else {
                        format!("Simulation did not converge (status {})", status_code)
                    },
                    OperationOutput::Simulation {
                        outcome: SimulationOutcome {
                            converged,
                            status_code,
                            diagnostics,
                        },
                    },
                ))
            }

            ValidatedOperation::GetResults { streams, fields } => {
                self.read_results(session, streams, fields).await
            }

            ValidatedOperation::SaveProject { path } => {
                self.call("save_as", engine.save_as(path)).await?;
                Ok(Reply::new(
                    format!("Project saved to {}", path.display()),
                    OperationOutput::ProjectSaved { path: path.clone() },
                ))
            }

            ValidatedOperation::ListComponents => {
                let components = self
                    .call("environment_components", engine.environment_components())
                    .await?;
                Ok(Reply::new(
                    format!("{} components registered", components.len()),
                    OperationOutput::Components { components },
                ))
            }

            ValidatedOperation::ListStreams => {
                let streams = self.call("list_streams", engine.list_streams()).await?;
                Ok(Reply::new(
                    format!("{} streams on the flowsheet", streams.len()),
                    OperationOutput::Streams { streams },
                ))
            }

            ValidatedOperation::CloseProject => {
                self.call("close", engine.close()).await?;
                Ok(Reply::new("Project closed", OperationOutput::ProjectClosed))
            }
        }
    }

    /// Registers each species not already in the environment. Querying the
    /// environment first makes a retried call pick up where it stopped.
    async fn add_components(
        &self,
        requested: &[String],
        prefailed: &[FailedComponent],
    ) -> Result<Reply, AdapterError> {
        let present = self
            .call("environment_components", self.engine.environment_components())
            .await?;
        let mut added = Vec::new();
        let mut failed = prefailed.to_vec();

        for name in requested {
            if present.iter().any(|p| p.eq_ignore_ascii_case(name)) {
                added.push(name.clone());
                continue;
            }
            match self
                .call("add_component", self.engine.add_component(name))
                .await
            {
                Ok(()) => added.push(name.clone()),
                Err(AdapterError::Fault { fault, .. }) if fault.class == FaultClass::Rejected => {
                    failed.push(FailedComponent {
                        name: name.clone(),
                        reason: fault.message,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        // session species follow the environment order, not the request order
        let registered = self
            .call("environment_components", self.engine.environment_components())
            .await?
            .into_iter()
            .map(|engine_name| {
                requested
                    .iter()
                    .find(|r| r.eq_ignore_ascii_case(&engine_name))
                    .cloned()
                    .unwrap_or(engine_name)
            })
            .collect();

        Ok(Reply::new(
            format!("Added {} components, {} failed", added.len(), failed.len()),
            OperationOutput::ComponentsAdded {
                added,
                failed,
                registered,
            },
        ))
    }

    async fn write_properties(
        &self,
        stream_id: &str,
        conditions: &StreamConditions,
    ) -> Result<PhaseProperties, AdapterError> {
        let canonical = conditions.to_canonical();
        let writes = [
            (PhaseProp::Temperature, canonical.temperature_k),
            (PhaseProp::Pressure, canonical.pressure_pa),
            (PhaseProp::MolarFlow, canonical.molar_flow_mol_s),
            (PhaseProp::MassFlow, canonical.mass_flow_kg_s),
        ];
        for (property, value) in writes {
            if let Some(value) = value {
                self.call(
                    "set_phase_property",
                    self.engine
                        .set_phase_property(stream_id, TOTAL_PHASE, property, value),
                )
                .await?;
            }
        }
        Ok(canonical)
    }

    async fn read_results(
        &self,
        session: &Session,
        streams: &[(String, String)],
        fields: &[ResultField],
    ) -> Result<Reply, AdapterError> {
        let mut results = Vec::with_capacity(streams.len());
        let mut environment: Option<Vec<String>> = None;
        for (name, stream_id) in streams {
            let readout = self
                .call("read_stream", self.engine.read_stream(stream_id))
                .await?;
            let composition = if readout.mole_fractions.is_empty() {
                None
            } else {
                let order = match environment.take() {
                    Some(order) => order,
                    None => {
                        self.call("environment_components", self.engine.environment_components())
                            .await?
                    }
                };
                let composition =
                    realign_fractions(&order, &readout.mole_fractions, &session.components);
                environment = Some(order);
                Some(composition)
            };
            results.push(StreamResults::from_canonical(
                name.clone(),
                &readout_properties(&readout),
                composition.as_ref(),
                &session.components,
                fields,
            ));
        }

        Ok(Reply::new(
            format!("Read results for {} streams", results.len()),
            OperationOutput::Results { streams: results },
        ))
    }
}

/// Reorders engine-ordered fractions into the session's species order,
/// matching by name. Species the engine does not report read as zero.
fn realign_fractions(
    engine_order: &[String],
    fractions: &[f64],
    components: &ComponentSet,
) -> Composition {
    if engine_order.len() != fractions.len() {
        debug!(
            species = engine_order.len(),
            fractions = fractions.len(),
            "Readout does not match the environment; keeping engine order"
        );
        return Composition::new(fractions.to_vec());
    }
    let mut aligned = vec![0.0; components.len()];
    for (engine_name, fraction) in engine_order.iter().zip(fractions) {
        if let Some(index) = components.index_of(engine_name) {
            aligned[index] = *fraction;
        }
    }
    Composition::new(aligned)
}

fn readout_properties(readout: &StreamReadout) -> PhaseProperties {
    PhaseProperties {
        temperature_k: readout.temperature_k,
        pressure_pa: readout.pressure_pa,
        molar_flow_mol_s: readout.molar_flow_mol_s,
        mass_flow_kg_s: readout.mass_flow_kg_s,
        vapor_fraction: readout.vapor_fraction,
    }
}

impl std::fmt::Debug for PrimaryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryAdapter")
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulatedEngine;
    use procflow_core::{BlockKind, StreamDirection};

    fn adapter(engine: Arc<SimulatedEngine>) -> PrimaryAdapter {
        PrimaryAdapter::new(engine, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_properties_are_written_in_si() {
        let engine = Arc::new(SimulatedEngine::new());
        let adapter = adapter(engine.clone());
        let session = Session::new("/tmp");
        engine.new_project().await.unwrap();
        engine.add_stream("210").await.unwrap();

        let op = ValidatedOperation::SetStreamProperties {
            stream: "210".to_string(),
            stream_id: "210".to_string(),
            conditions: StreamConditions {
                temperature_c: Some(43.0),
                pressure_kpa: Some(552.0),
                molar_flow_kmol_h: Some(196.9),
                mass_flow_kg_h: None,
            },
        };
        adapter.execute(&session, &op).await.unwrap();

        let readout = engine.read_stream("210").await.unwrap();
        assert!((readout.temperature_k.unwrap() - 316.15).abs() < 1e-9);
        assert!((readout.pressure_pa.unwrap() - 552_000.0).abs() < 1e-6);
        assert!((readout.molar_flow_mol_s.unwrap() - 54.694).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_inlet_glues_downstream_end() {
        let engine = Arc::new(SimulatedEngine::new());
        let adapter = adapter(engine.clone());
        let session = Session::new("/tmp");
        engine.new_project().await.unwrap();
        let block_id = engine
            .add_block(BlockKind::Separator.stencil(), "V-100")
            .await
            .unwrap();
        engine.add_stream("feed").await.unwrap();

        let op = ValidatedOperation::ConnectStream {
            stream: "feed".to_string(),
            stream_id: "feed".to_string(),
            block: "V-100".to_string(),
            block_id,
            direction: StreamDirection::Inlet,
            port: 1,
        };
        let reply = adapter.execute(&session, &op).await.unwrap();

        assert!(matches!(
            reply.output,
            OperationOutput::StreamConnected {
                end: procflow_core::StreamEnd::Downstream,
                ..
            }
        ));
        assert!(engine
            .calls()
            .iter()
            .any(|c| c == "glue"));
    }

    #[tokio::test]
    async fn test_add_components_reports_rejections() {
        let engine = Arc::new(SimulatedEngine::new());
        let adapter = adapter(engine.clone());
        let session = Session::new("/tmp");
        engine.new_project().await.unwrap();

        let op = ValidatedOperation::AddComponents {
            requested: vec!["Methane".to_string(), "Unobtainium".to_string()],
            failed: Vec::new(),
            warnings: Vec::new(),
        };
        let reply = adapter.execute(&session, &op).await.unwrap();

        let OperationOutput::ComponentsAdded { added, failed, .. } = reply.output else {
            panic!("wrong output");
        };
        assert_eq!(added, vec!["Methane".to_string()]);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "Unobtainium");
    }

    #[tokio::test]
    async fn test_add_components_is_idempotent_on_retry() {
        let engine = Arc::new(SimulatedEngine::new());
        let adapter = adapter(engine.clone());
        let session = Session::new("/tmp");
        engine.new_project().await.unwrap();
        engine.add_component("Water").await.unwrap();

        let op = ValidatedOperation::AddComponents {
            requested: vec!["Water".to_string(), "MDEA".to_string()],
            failed: Vec::new(),
            warnings: Vec::new(),
        };
        adapter.execute(&session, &op).await.unwrap();

        assert_eq!(
            engine.environment_components().await.unwrap(),
            vec!["Water".to_string(), "MDEA".to_string()]
        );
    }

    #[tokio::test]
    async fn test_add_components_reports_engine_order() {
        let engine = Arc::new(SimulatedEngine::new());
        let adapter = adapter(engine.clone());
        let session = Session::new("/tmp");
        engine.new_project().await.unwrap();
        engine.add_component("Water").await.unwrap();

        let op = ValidatedOperation::AddComponents {
            requested: vec!["MDEA".to_string(), "Water".to_string()],
            failed: Vec::new(),
            warnings: Vec::new(),
        };
        let reply = adapter.execute(&session, &op).await.unwrap();

        let OperationOutput::ComponentsAdded { registered, .. } = reply.output else {
            panic!("wrong output");
        };
        assert_eq!(registered, vec!["Water".to_string(), "MDEA".to_string()]);
    }

    #[tokio::test]
    async fn test_results_label_fractions_by_name() {
        let engine = Arc::new(SimulatedEngine::new());
        let adapter = adapter(engine.clone());
        engine.new_project().await.unwrap();
        engine.add_component("Water").await.unwrap();
        engine.add_component("MDEA").await.unwrap();
        engine.add_stream("220").await.unwrap();
        engine
            .set_composition("220", TOTAL_PHASE, MOLAR_FRACTION_BASIS, &[0.9, 0.1])
            .await
            .unwrap();

        let mut session = Session::new("/tmp");
        session.components = ["MDEA", "Water"].into_iter().map(String::from).collect();

        let op = ValidatedOperation::GetResults {
            streams: vec![("220".to_string(), "220".to_string())],
            fields: vec![ResultField::Composition],
        };
        let reply = adapter.execute(&session, &op).await.unwrap();

        let OperationOutput::Results { streams } = reply.output else {
            panic!("wrong output");
        };
        assert_eq!(streams[0].composition.get("Water"), Some(&0.9));
        assert_eq!(streams[0].composition.get("MDEA"), Some(&0.1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_engine_times_out() {
        let engine = Arc::new(SimulatedEngine::new().with_latency(Duration::from_secs(10)));
        let adapter = PrimaryAdapter::new(engine, Duration::from_secs(1));
        let session = Session::new("/tmp");

        let err = adapter
            .execute(&session, &ValidatedOperation::CreateProject)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AdapterError::Timeout {
                command: "new_project",
                after_ms: 1_000
            }
        );
    }
}
