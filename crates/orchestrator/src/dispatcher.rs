//! Per-operation pipeline: sequence check, validation, primary engine call
//! with bounded retries, GUI fallback, and commit into the session.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use procflow_core::{Backend, Block, ComponentSet, Endpoint, Session, Stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use events::{Event, EventBus};

use crate::config::OrchestratorConfig;
use crate::engine::{AdapterError, EngineBackend, FaultClass, PrimaryAdapter, Reply};
use crate::error::{OrchestratorError, Result};
use crate::fallback::{AutomationDriver, FallbackAdapter, FallbackError, Playbook};
use crate::gate::ValidationGate;
use crate::operation::{Operation, OperationOutput, OperationResponse, ValidatedOperation};
use crate::registry::{OperationRegistry, OperationSpec};
use crate::resources::OperationGuard;
use crate::state_machine::FlowsheetStateMachine;

/// Retry bound for transient engine faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Wait before attempt `attempt + 1`, doubling from the base.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(250),
        }
    }
}

/// Executes operations for one session. Holds no session state itself; the
/// caller passes the session in under its exclusive lock.
pub struct Dispatcher {
    session_id: Uuid,
    registry: Arc<OperationRegistry>,
    primary: PrimaryAdapter,
    fallback: FallbackAdapter,
    playbooks: Arc<BTreeMap<String, Playbook>>,
    retry: RetryPolicy,
    call_timeout: Duration,
    event_bus: Option<EventBus>,
}

struct Executed {
    reply: Reply,
    backend: Backend,
    attempts: u32,
}

impl Dispatcher {
    pub fn new(
        session_id: Uuid,
        engine: Arc<dyn EngineBackend>,
        driver: Arc<dyn AutomationDriver>,
        registry: Arc<OperationRegistry>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            session_id,
            registry,
            primary: PrimaryAdapter::new(engine, config.engine_call_timeout()),
            fallback: FallbackAdapter::new(driver, config.fallback.clone()),
            playbooks: Arc::new(config.playbooks.clone()),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_base: config.backoff_base(),
            },
            call_timeout: config.engine_call_timeout(),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub async fn dispatch(
        &self,
        session: &mut Session,
        operation: &Operation,
        cancel: &CancellationToken,
    ) -> Result<OperationResponse> {
        let name = operation.name();
        let mut guard = OperationGuard::new(session.id, name, self.event_bus.clone());

        let result = self.run(session, operation, cancel).await;
        match &result {
            Ok(response) => {
                guard.mark_completed();
                info!(
                    session_id = %session.id,
                    operation = %name,
                    backend = ?response.backend,
                    attempts = response.attempts,
                    phase = %response.phase,
                    "Operation completed"
                );
            }
            Err(e) => {
                if e.is_validation() || matches!(e, OrchestratorError::Sequence { .. }) {
                    warn!(session_id = %session.id, operation = %name, error = %e, "Operation rejected");
                } else {
                    error!(session_id = %session.id, operation = %name, error = %e, "Operation failed");
                }
                guard.mark_failed(e);
            }
        }
        result
    }

    async fn run(
        &self,
        session: &mut Session,
        operation: &Operation,
        cancel: &CancellationToken,
    ) -> Result<OperationResponse> {
        if session.degraded {
            return Err(OrchestratorError::SessionDegraded(session.id));
        }

        let spec = self.registry.check(operation.name(), session.phase)?.clone();
        check_stream_locks(session, operation)?;
        let validated = ValidationGate::validate(session, operation)?;

        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled {
                operation: spec.name.to_string(),
            });
        }

        let executed = self.execute(session, &spec, &validated, cancel).await?;
        Ok(self.commit(session, &spec, &validated, executed))
    }

    async fn execute(
        &self,
        session: &mut Session,
        spec: &OperationSpec,
        validated: &ValidatedOperation,
        cancel: &CancellationToken,
    ) -> Result<Executed> {
        let operation = spec.name;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(session_id = %session.id, operation, attempt, "Primary attempt");

            let fault = match self.primary.execute(session, validated).await {
                Ok(reply) => {
                    return Ok(Executed {
                        reply,
                        backend: Backend::Primary,
                        attempts: attempt,
                    })
                }
                Err(AdapterError::Timeout { command, after_ms }) => {
                    self.degrade(session, format!("{} timed out after {}ms", command, after_ms));
                    return Err(OrchestratorError::EngineUnresponsive {
                        operation: operation.to_string(),
                        timeout_ms: after_ms,
                    });
                }
                Err(AdapterError::Fault { fault, .. }) => fault,
            };

            match fault.class {
                FaultClass::Disconnected => {
                    self.degrade(session, fault.message.clone());
                    return Err(OrchestratorError::EngineUnresponsive {
                        operation: operation.to_string(),
                        timeout_ms: self.call_timeout.as_millis() as u64,
                    });
                }
                FaultClass::Rejected => {
                    return Err(OrchestratorError::EngineRejected {
                        operation: operation.to_string(),
                        code: fault.code,
                        message: fault.message,
                    });
                }
                FaultClass::Unsupported => {
                    if spec.fallback_eligible && self.playbooks.contains_key(operation) {
                        return self.fallback(session, validated, operation, &fault.message, cancel).await;
                    }
                    return Err(OrchestratorError::UnsupportedOperation {
                        operation: operation.to_string(),
                        message: fault.message,
                    });
                }
                FaultClass::Transient if attempt <= self.retry.max_retries => {
                    let wait = self.retry.backoff(attempt);
                    warn!(
                        session_id = %session.id,
                        operation,
                        attempt,
                        backoff_ms = wait.as_millis() as u64,
                        error = %fault,
                        "Transient engine fault, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(OrchestratorError::Cancelled {
                                operation: operation.to_string(),
                            });
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                FaultClass::Transient => {
                    if spec.fallback_eligible && self.playbooks.contains_key(operation) {
                        let reason = format!("{} after {} attempts", fault.message, attempt);
                        return self.fallback(session, validated, operation, &reason, cancel).await;
                    }
                    return Err(OrchestratorError::RecoverableEngine {
                        operation: operation.to_string(),
                        attempts: attempt,
                        message: fault.message,
                    });
                }
            }
        }
    }

    async fn fallback(
        &self,
        session: &mut Session,
        validated: &ValidatedOperation,
        operation: &str,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<Executed> {
        let Some(playbook) = self.playbooks.get(operation) else {
            return Err(OrchestratorError::UnsupportedOperation {
                operation: operation.to_string(),
                message: reason.to_string(),
            });
        };

        warn!(session_id = %session.id, operation, reason, "Invoking GUI fallback");
        self.emit(Event::FallbackInvoked {
            session_id: session.id,
            operation: operation.to_string(),
            reason: reason.to_string(),
        });

        let vars = playbook_vars(validated);
        match self.fallback.run(operation, playbook, &vars, cancel).await {
            Ok(report) => {
                let reply = synthesize_reply(session, validated).ok_or_else(|| {
                    OrchestratorError::UnsupportedOperation {
                        operation: operation.to_string(),
                        message: "fallback cannot report this operation's result".to_string(),
                    }
                })?;
                Ok(Executed {
                    reply,
                    backend: Backend::Fallback,
                    attempts: report.attempts,
                })
            }
            Err(FallbackError::Exhausted { step, attempts }) => {
                Err(OrchestratorError::FallbackExhausted {
                    operation: operation.to_string(),
                    step,
                    attempts,
                })
            }
            Err(FallbackError::Timeout { step, after_ms }) => {
                self.degrade(
                    session,
                    format!("fallback step {} timed out after {}ms", step, after_ms),
                );
                Err(OrchestratorError::EngineUnresponsive {
                    operation: operation.to_string(),
                    timeout_ms: after_ms,
                })
            }
            Err(FallbackError::Cancelled { .. }) => Err(OrchestratorError::Cancelled {
                operation: operation.to_string(),
            }),
            Err(FallbackError::Driver(e)) => Err(OrchestratorError::Bridge(e.to_string())),
        }
    }

    /// Apply a successful result to the session and advance its phase.
    fn commit(
        &self,
        session: &mut Session,
        spec: &OperationSpec,
        validated: &ValidatedOperation,
        executed: Executed,
    ) -> OperationResponse {
        let Executed {
            reply,
            backend,
            attempts,
        } = executed;
        let phase_before = session.phase;
        let mut resulting = spec.resulting;

        match &reply.output {
            OperationOutput::ProjectCreated { .. } | OperationOutput::Components { .. } => {}
            OperationOutput::Streams { .. } | OperationOutput::ProjectSaved { .. } => {}
            OperationOutput::FlowsheetCreated { name, .. } => {
                session.flowsheet = Some(name.clone());
            }
            OperationOutput::ComponentsAdded {
                added, registered, ..
            } => {
                // rebuilt in engine order
                let (mut components, names) = if registered.is_empty() {
                    (session.components.clone(), added)
                } else {
                    (ComponentSet::new(), registered)
                };
                for name in names {
                    if components.contains(name) {
                        continue;
                    }
                    if let Err(e) = components.push(name.clone()) {
                        warn!(session_id = %session.id, species = %name, error = %e, "Species not recorded");
                    }
                }
                session.components = components;
                if session.components.is_empty() {
                    resulting = None;
                }
            }
            OperationOutput::BlockCreated {
                name,
                kind,
                engine_id,
            } => {
                session.blocks.push(Block::new(name.clone(), *kind, engine_id.clone()));
            }
            OperationOutput::StreamCreated { name, stream_id } => {
                session.streams.push(Stream::new(name.clone(), stream_id.clone()));
            }
            OperationOutput::StreamConnected {
                stream,
                block,
                port,
                end,
            } => {
                if let Some(s) = session.stream_mut(stream) {
                    s.attach(
                        *end,
                        Endpoint {
                            block: block.clone(),
                            port: *port,
                        },
                    );
                }
            }
            OperationOutput::PropertiesSet { stream, properties } => {
                if let Some(s) = session.stream_mut(stream) {
                    s.properties.merge(properties);
                }
            }
            OperationOutput::ParametersAdjusted { stream, properties } => {
                if let Some(s) = session.stream_mut(stream) {
                    s.properties.merge(properties);
                    s.unlock();
                }
                session.results.clear();
                session.last_outcome = None;
            }
            OperationOutput::CompositionSet {
                stream,
                composition,
                ..
            } => {
                if let Some(s) = session.stream_mut(stream) {
                    s.composition = Some(composition.clone());
                }
            }
            OperationOutput::StreamFlashed { stream, properties } => {
                if let Some(s) = session.stream_mut(stream) {
                    s.properties = properties.clone();
                    s.flashed = true;
                }
            }
            OperationOutput::Simulation { outcome } => {
                if !outcome.converged {
                    resulting = None;
                }
                session.last_outcome = Some(outcome.clone());
                self.emit(Event::SimulationFinished {
                    session_id: session.id,
                    converged: outcome.converged,
                    status_code: outcome.status_code,
                });
            }
            OperationOutput::Results { streams } => {
                for result in streams {
                    session.results.insert(result.stream.clone(), result.clone());
                }
            }
            OperationOutput::ProjectClosed => {
                session.clear_flowsheet();
            }
        }

        if let OperationOutput::ProjectSaved { path } = &reply.output {
            session.project_path = Some(path.clone());
        }

        session.phase = match FlowsheetStateMachine::advance(phase_before, resulting, spec.back_edge) {
            Ok(phase) => phase,
            Err(e) => {
                // the registry bounds make this unreachable; keep the phase
                error!(session_id = %session.id, operation = spec.name, error = %e, "Phase advance refused");
                phase_before
            }
        };

        session.record(spec.name, backend, attempts, phase_before, reply.message.clone());

        self.emit(Event::OperationCompleted {
            session_id: session.id,
            operation: spec.name.to_string(),
            backend: backend.as_str().to_string(),
            attempts,
            message: reply.message.clone(),
        });
        if session.phase != phase_before {
            info!(
                session_id = %session.id,
                from = %phase_before,
                to = %session.phase,
                "Phase changed"
            );
            self.emit(Event::PhaseChanged {
                session_id: session.id,
                from_phase: phase_before.to_string(),
                to_phase: session.phase.to_string(),
            });
        }

        let warnings = match validated {
            ValidatedOperation::AddComponents { warnings, .. } => warnings.clone(),
            _ => Vec::new(),
        };

        OperationResponse {
            operation: spec.name.to_string(),
            backend,
            attempts,
            phase: session.phase,
            message: reply.message,
            warnings,
            output: reply.output,
        }
    }

    fn degrade(&self, session: &mut Session, reason: String) {
        error!(session_id = %session.id, reason = %reason, "Session degraded");
        session.degraded = true;
        self.emit(Event::SessionDegraded {
            session_id: session.id,
            reason,
        });
    }

    fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event);
        }
    }
}

fn check_stream_locks(session: &Session, operation: &Operation) -> Result<()> {
    match operation {
        Operation::SetStreamProperties { stream, .. }
        | Operation::SetStreamComposition { stream, .. } => {
            FlowsheetStateMachine::check_stream_writable(session, stream, operation.name())
        }
        Operation::FlashStream { stream } => {
            FlowsheetStateMachine::check_ready_to_flash(session, stream)
        }
        Operation::RunSimulation => FlowsheetStateMachine::check_ready_to_solve(session),
        _ => Ok(()),
    }
}

/// Placeholder values a playbook step can reference.
fn playbook_vars(validated: &ValidatedOperation) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let mut set = |key: &str, value: String| {
        vars.insert(key.to_string(), value);
    };
    match validated {
        ValidatedOperation::AddFlowsheet { name } | ValidatedOperation::CreateStream { name } => {
            set("name", name.clone());
        }
        ValidatedOperation::CreateBlock { name, kind } => {
            set("name", name.clone());
            set("kind", kind.as_str().to_string());
            set("master", kind.stencil().master.to_string());
            set("stencil", kind.stencil().stencil.to_string());
        }
        ValidatedOperation::ConnectStream {
            stream,
            block,
            direction,
            port,
            ..
        } => {
            set("stream", stream.clone());
            set("block", block.clone());
            set("direction", direction.as_str().to_string());
            set("port", port.to_string());
        }
        ValidatedOperation::SetStreamProperties {
            stream, conditions, ..
        }
        | ValidatedOperation::AdjustParameters {
            stream, conditions, ..
        } => {
            set("stream", stream.clone());
            let fields = [
                ("temperature_c", conditions.temperature_c),
                ("pressure_kpa", conditions.pressure_kpa),
                ("molar_flow_kmol_h", conditions.molar_flow_kmol_h),
                ("mass_flow_kg_h", conditions.mass_flow_kg_h),
            ];
            for (key, value) in fields {
                if let Some(value) = value {
                    set(key, value.to_string());
                }
            }
        }
        ValidatedOperation::SetStreamComposition {
            stream,
            composition,
            ..
        } => {
            set("stream", stream.clone());
            let csv: Vec<String> = composition.fractions().iter().map(|x| x.to_string()).collect();
            set("fractions", csv.join(","));
        }
        ValidatedOperation::SaveProject { path } => {
            set("path", path.display().to_string());
        }
        _ => {}
    }
    vars
}

/// Output of an operation carried out through the engine window. The window
/// reports nothing back, so engine ids are taken to be the names typed.
fn synthesize_reply(session: &Session, validated: &ValidatedOperation) -> Option<Reply> {
    let (message, output) = match validated {
        ValidatedOperation::AddFlowsheet { name } => (
            format!("Flowsheet '{}' created through the engine window", name),
            OperationOutput::FlowsheetCreated {
                name: name.clone(),
                flowsheet_id: name.clone(),
            },
        ),
        ValidatedOperation::CreateBlock { name, kind } => (
            format!("Block '{}' placed through the engine window", name),
            OperationOutput::BlockCreated {
                name: name.clone(),
                kind: *kind,
                engine_id: name.clone(),
            },
        ),
        ValidatedOperation::CreateStream { name } => (
            format!("Stream '{}' placed through the engine window", name),
            OperationOutput::StreamCreated {
                name: name.clone(),
                stream_id: name.clone(),
            },
        ),
        ValidatedOperation::ConnectStream {
            stream,
            block,
            direction,
            port,
            ..
        } => (
            format!(
                "Stream '{}' connected to {} port {} of '{}' through the engine window",
                stream,
                direction.as_str(),
                port,
                block
            ),
            OperationOutput::StreamConnected {
                stream: stream.clone(),
                block: block.clone(),
                port: *port,
                end: direction.glued_end(),
            },
        ),
        ValidatedOperation::SetStreamProperties {
            stream, conditions, ..
        } => (
            format!("Properties set on '{}': {}", stream, conditions.describe()),
            OperationOutput::PropertiesSet {
                stream: stream.clone(),
                properties: conditions.to_canonical(),
            },
        ),
        ValidatedOperation::AdjustParameters {
            stream, conditions, ..
        } => (
            format!("Adjusted '{}': {}", stream, conditions.describe()),
            OperationOutput::ParametersAdjusted {
                stream: stream.clone(),
                properties: conditions.to_canonical(),
            },
        ),
        ValidatedOperation::SetStreamComposition {
            stream,
            composition,
            ..
        } => (
            format!("Composition set on '{}'", stream),
            OperationOutput::CompositionSet {
                stream: stream.clone(),
                composition: composition.clone(),
                fractions: composition.to_map(&session.components),
                sum: composition.sum(),
            },
        ),
        ValidatedOperation::SaveProject { path } => (
            format!("Project saved to {}", path.display()),
            OperationOutput::ProjectSaved { path: path.clone() },
        ),
        _ => return None,
    };
    Some(Reply { message, output })
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("session_id", &self.session_id)
            .field("retry", &self.retry)
            .field("playbooks", &self.playbooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use procflow_core::{BlockKind, CompositionInput, StreamDirection, WorkflowPhase};

    use super::*;
    use crate::config::FallbackSettings;
    use crate::engine::{EngineFault, SimulatedEngine};
    use crate::fallback::{SimulatedDesktop, SimulatedScreen};
    use crate::operation::SpeciesList;

    struct Rig {
        engine: Arc<SimulatedEngine>,
        screen: Arc<SimulatedScreen>,
        dispatcher: Dispatcher,
        session: Session,
        cancel: CancellationToken,
        bus: EventBus,
    }

    impl Rig {
        fn new(engine: SimulatedEngine, screen: SimulatedScreen) -> Self {
            let config = OrchestratorConfig::new("/tmp/procflow-tests")
                .with_backoff_base(Duration::from_millis(10))
                .with_engine_call_timeout(Duration::from_secs(1))
                .with_fallback(FallbackSettings {
                    max_attempts: 3,
                    verify_wait_ms: 1,
                    step_timeout_ms: 1_000,
                });
            let engine = Arc::new(engine);
            let screen = Arc::new(screen);
            let driver = Arc::new(SimulatedDesktop::new(screen.clone(), engine.clone()));
            let session = Session::new(&config.working_dir);
            let bus = EventBus::new();
            let dispatcher = Dispatcher::new(
                session.id,
                engine.clone(),
                driver,
                Arc::new(OperationRegistry::standard()),
                &config,
            )
            .with_event_bus(bus.clone());

            Self {
                engine,
                screen,
                dispatcher,
                session,
                cancel: CancellationToken::new(),
                bus,
            }
        }

        fn simulated() -> Self {
            Self::new(SimulatedEngine::new(), SimulatedScreen::new(64, 64))
        }

        async fn run(&mut self, op: Operation) -> Result<OperationResponse> {
            self.dispatcher
                .dispatch(&mut self.session, &op, &self.cancel)
                .await
        }

        async fn to_components(&mut self) {
            self.run(Operation::CreateProject).await.unwrap();
            self.run(Operation::AddFlowsheet {
                name: "FS-1".to_string(),
            })
            .await
            .unwrap();
            self.run(Operation::AddComponents {
                components: SpeciesList::List(vec!["Water".to_string(), "MDEA".to_string()]),
            })
            .await
            .unwrap();
        }
    }

    fn create_treater() -> Operation {
        Operation::CreateBlock {
            kind: BlockKind::AmineTreater,
            name: "301-E".to_string(),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 2,
            backoff_base: Duration::from_millis(250),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_fault_that_clears_is_retried() {
        let mut rig = Rig::simulated();
        rig.engine.inject_fault("new_project", EngineFault::transient("busy"));
        rig.engine.inject_fault("new_project", EngineFault::transient("busy"));

        let response = rig.run(Operation::CreateProject).await.unwrap();

        assert_eq!(response.attempts, 3);
        assert_eq!(response.backend, Backend::Primary);
        assert_eq!(rig.session.phase, WorkflowPhase::ProjectCreated);
        assert_eq!(rig.session.log[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_transient_fault_surfaces_after_three_attempts() {
        let mut rig = Rig::simulated();
        for _ in 0..3 {
            rig.engine.inject_fault("new_project", EngineFault::transient("busy"));
        }

        let err = rig.run(Operation::CreateProject).await.unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::RecoverableEngine { attempts: 3, .. }
        ));
        assert_eq!(rig.engine.call_count("new_project"), 3);
        assert_eq!(rig.session.phase, WorkflowPhase::Uninitialized);
        assert!(rig.session.log.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_fault_is_not_retried() {
        let mut rig = Rig::simulated();
        rig.run(Operation::CreateProject).await.unwrap();
        rig.engine
            .inject_fault("add_flowsheet", EngineFault::rejected(7, "document is read-only"));

        let err = rig
            .run(Operation::AddFlowsheet {
                name: "FS-1".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::EngineRejected { code: 7, .. }));
        assert_eq!(rig.engine.call_count("add_flowsheet"), 1);
        assert_eq!(rig.session.phase, WorkflowPhase::ProjectCreated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades_session() {
        let mut rig = Rig::new(
            SimulatedEngine::new().with_latency(Duration::from_secs(5)),
            SimulatedScreen::new(64, 64),
        );

        let err = rig.run(Operation::CreateProject).await.unwrap_err();
        assert_eq!(err.kind(), "engine_unresponsive");
        assert!(rig.session.degraded);

        let err = rig.run(Operation::CreateProject).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::SessionDegraded(_)));
    }

    #[tokio::test]
    async fn test_disconnect_degrades_session() {
        let mut rig = Rig::simulated();
        rig.engine
            .inject_fault("new_project", EngineFault::disconnected("bridge went away"));

        let err = rig.run(Operation::CreateProject).await.unwrap_err();

        assert_eq!(err.kind(), "engine_unresponsive");
        assert!(rig.session.degraded);
    }

    #[tokio::test]
    async fn test_validation_failure_never_reaches_engine() {
        let mut rig = Rig::simulated();
        rig.to_components().await;
        let calls = rig.engine.calls().len();

        let err = rig
            .run(Operation::CreateStream {
                name: "  ".to_string(),
            })
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(rig.engine.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_sequence_error_before_engine() {
        let mut rig = Rig::simulated();
        let err = rig.run(Operation::RunSimulation).await.unwrap_err();

        assert_eq!(err.kind(), "sequence_error");
        assert!(rig.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_block_falls_back_to_gui() {
        let mut rig = Rig::new(
            SimulatedEngine::new().with_unsupported_kinds(&[BlockKind::AmineTreater]),
            SimulatedScreen::new(1920, 1080),
        );
        rig.to_components().await;

        let response = rig.run(create_treater()).await.unwrap();

        assert_eq!(response.backend, Backend::Fallback);
        let block = rig.session.block("301-E").unwrap();
        assert_eq!(block.engine_id, "301-E");
        assert_eq!(rig.engine.call_count("add_block"), 1);
        assert!(rig.screen.typed().contains(&"Distill".to_string()));
    }

    #[tokio::test]
    async fn test_frozen_window_exhausts_fallback_without_advancing() {
        let mut rig = Rig::new(
            SimulatedEngine::new().with_unsupported_kinds(&[BlockKind::AmineTreater]),
            SimulatedScreen::new(1920, 1080).frozen(),
        );
        rig.to_components().await;
        let phase = rig.session.phase;

        let err = rig.run(create_treater()).await.unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::FallbackExhausted {
                step: 1,
                attempts: 3,
                ..
            }
        ));
        assert_eq!(rig.engine.call_count("add_block"), 1);
        assert_eq!(rig.session.phase, phase);
        assert!(rig.session.block("301-E").is_none());
    }

    #[tokio::test]
    async fn test_unsupported_without_playbook_surfaces() {
        let mut rig = Rig::simulated();
        rig.run(Operation::CreateProject).await.unwrap();
        rig.engine
            .inject_fault("add_flowsheet", EngineFault::unsupported("dialog only"));

        let err = rig
            .run(Operation::AddFlowsheet {
                name: "FS-1".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "unsupported_operation");
        assert_eq!(rig.screen.action_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_engine() {
        let mut rig = Rig::simulated();
        rig.cancel.cancel();

        let err = rig.run(Operation::CreateProject).await.unwrap_err();

        assert_eq!(err.kind(), "cancelled");
        assert!(rig.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_success_publishes_events() {
        let mut rig = Rig::simulated();
        let mut rx = rig.bus.subscribe();

        rig.run(Operation::CreateProject).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event.event_type(), "operation.completed");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event.event_type(), "phase.changed");
    }

    async fn build_feed(rig: &mut Rig, fractions: &[(&str, f64)]) {
        for op in [
            Operation::CreateBlock {
                kind: BlockKind::Separator,
                name: "V-100".to_string(),
            },
            Operation::CreateStream {
                name: "S1".to_string(),
            },
            Operation::ConnectStream {
                stream: "S1".to_string(),
                block: "V-100".to_string(),
                direction: StreamDirection::Inlet,
                port: 1,
            },
            Operation::SetStreamProperties {
                stream: "S1".to_string(),
                temperature_c: Some(43.0),
                pressure_kpa: Some(552.0),
                molar_flow_kmol_h: Some(100.0),
                mass_flow_kg_h: None,
            },
            Operation::SetStreamComposition {
                stream: "S1".to_string(),
                composition: CompositionInput::Fractions(
                    fractions
                        .iter()
                        .map(|(name, x)| (name.to_string(), *x))
                        .collect(),
                ),
            },
        ] {
            rig.run(op).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_preregistered_species_keep_engine_order() {
        let mut rig = Rig::simulated();
        rig.run(Operation::CreateProject).await.unwrap();
        rig.run(Operation::AddFlowsheet {
            name: "FS-1".to_string(),
        })
        .await
        .unwrap();
        rig.engine.add_component("Water").await.unwrap();

        rig.run(Operation::AddComponents {
            components: SpeciesList::List(vec!["MDEA".to_string(), "Water".to_string()]),
        })
        .await
        .unwrap();

        let engine_order = rig.engine.environment_components().await.unwrap();
        assert_eq!(engine_order, vec!["Water".to_string(), "MDEA".to_string()]);
        assert_eq!(rig.session.components.names(), engine_order.as_slice());

        build_feed(&mut rig, &[("MDEA", 0.1), ("Water", 0.9)]).await;

        let readout = rig.engine.read_stream("S1").await.unwrap();
        assert_eq!(readout.mole_fractions, vec![0.9, 0.1]);
    }

    #[tokio::test]
    async fn test_flash_twice_is_idempotent() {
        let mut rig = Rig::simulated();
        rig.to_components().await;
        build_feed(&mut rig, &[("Water", 0.8), ("MDEA", 0.2)]).await;

        let flash = Operation::FlashStream {
            stream: "S1".to_string(),
        };
        let first = rig.run(flash.clone()).await.unwrap();
        let second = rig.run(flash).await.unwrap();

        assert_eq!(first.phase, WorkflowPhase::Flashed);
        assert_eq!(second.phase, WorkflowPhase::Flashed);
        assert_eq!(rig.session.phase, WorkflowPhase::Flashed);
        let (
            OperationOutput::StreamFlashed {
                properties: before, ..
            },
            OperationOutput::StreamFlashed {
                properties: after, ..
            },
        ) = (&first.output, &second.output)
        else {
            panic!("flash did not report properties");
        };
        assert_eq!(before, after);
        assert!(after.vapor_fraction.is_some());
    }

    #[tokio::test]
    async fn test_close_project_tears_down() {
        let mut rig = Rig::simulated();
        rig.to_components().await;

        let response = rig.run(Operation::CloseProject).await.unwrap();

        assert_eq!(response.phase, WorkflowPhase::Uninitialized);
        assert!(rig.session.components.is_empty());
        assert!(rig.session.flowsheet.is_none());
    }
}
