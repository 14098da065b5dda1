use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use procflow_core::{AssessmentReport, OperationRecord, PerformanceTarget, Session, WorkflowPhase};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use events::{Event, EventBus};

use crate::backends::{self, BackendFactory};
use crate::config::OrchestratorConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{OrchestratorError, Result};
use crate::operation::{Operation, OperationOutput, OperationResponse};
use crate::registry::{standard_specs, OperationRegistry};
use crate::results::ResultAggregator;

/// Listing entry. Phase and degraded flag are absent while an operation
/// holds the session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    pub phase: Option<WorkflowPhase>,
    pub degraded: Option<bool>,
    pub busy: bool,
}

struct SessionHandle {
    session: Mutex<Session>,
    dispatcher: Dispatcher,
    cancel: std::sync::Mutex<CancellationToken>,
}

impl SessionHandle {
    /// Token for the operation about to start; a token cancelled earlier is
    /// replaced so a stale cancel does not leak into it.
    fn arm(&self) -> CancellationToken {
        match self.cancel.lock() {
            Ok(mut token) => {
                if token.is_cancelled() {
                    *token = CancellationToken::new();
                }
                token.clone()
            }
            Err(_) => CancellationToken::new(),
        }
    }

    fn cancel(&self) {
        if let Ok(token) = self.cancel.lock() {
            token.cancel();
        }
    }
}

/// Owns every live session. Each session has its own lock, engine
/// connection and automation driver; nothing is shared between sessions
/// except the event bus.
pub struct SessionManager {
    config: OrchestratorConfig,
    registry: Arc<OperationRegistry>,
    backends: Arc<dyn BackendFactory>,
    sessions: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
    event_bus: EventBus,
}

impl SessionManager {
    pub fn new(
        config: OrchestratorConfig,
        backends: Arc<dyn BackendFactory>,
        event_bus: EventBus,
    ) -> Result<Self> {
        let registry = OperationRegistry::new(standard_specs())?;
        Ok(Self {
            config,
            registry: Arc::new(registry),
            backends,
            sessions: RwLock::new(HashMap::new()),
            event_bus,
        })
    }

    /// Backends chosen by `config.backend`.
    pub fn from_config(config: OrchestratorConfig, event_bus: EventBus) -> Result<Self> {
        let backends = backends::from_config(&config.backend);
        Self::new(config, backends, event_bus)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Open a session and run `create_project` on it. A session whose
    /// project cannot be created is discarded.
    pub async fn create_session(&self) -> Result<(Uuid, OperationResponse)> {
        let session = Session::new(&self.config.working_dir);
        let id = session.id;
        let dispatcher = Dispatcher::new(
            id,
            self.backends.engine(id),
            self.backends.driver(id),
            Arc::clone(&self.registry),
            &self.config,
        )
        .with_event_bus(self.event_bus.clone());

        let handle = Arc::new(SessionHandle {
            session: Mutex::new(session),
            dispatcher,
            cancel: std::sync::Mutex::new(CancellationToken::new()),
        });
        self.sessions.write().await.insert(id, handle);

        info!(session_id = %id, working_dir = %self.config.working_dir.display(), "Session created");
        self.event_bus.emit(Event::SessionCreated {
            session_id: id,
            working_dir: self.config.working_dir.display().to_string(),
        });

        match self.dispatch(id, &Operation::CreateProject).await {
            Ok(response) => Ok((id, response)),
            Err(e) => {
                self.sessions.write().await.remove(&id);
                self.backends.release(id);
                self.event_bus.emit(Event::SessionClosed { session_id: id });
                Err(e)
            }
        }
    }

    /// Run one operation. Waits up to the lock timeout for an operation
    /// already running on the same session.
    pub async fn dispatch(&self, id: Uuid, operation: &Operation) -> Result<OperationResponse> {
        let handle = self.handle(id).await?;
        let mut session = self.lock(id, &handle).await?;
        let cancel = handle.arm();
        handle.dispatcher.dispatch(&mut session, operation, &cancel).await
    }

    /// Read the streams the targets refer to and compare them.
    pub async fn assess(&self, id: Uuid, targets: &[PerformanceTarget]) -> Result<AssessmentReport> {
        let handle = self.handle(id).await?;
        let mut session = self.lock(id, &handle).await?;

        let wanted: BTreeSet<String> = targets
            .iter()
            .flat_map(|t| std::iter::once(t.stream.clone()).chain(t.manipulated_stream.clone()))
            .filter(|name| session.stream(name).is_some())
            .collect();

        let mut results = BTreeMap::new();
        if !wanted.is_empty() {
            let operation = Operation::GetResults {
                streams: wanted.into_iter().collect(),
                properties: Vec::new(),
            };
            let cancel = handle.arm();
            let response = handle
                .dispatcher
                .dispatch(&mut session, &operation, &cancel)
                .await?;
            if let OperationOutput::Results { streams } = response.output {
                results = streams.into_iter().map(|r| (r.stream.clone(), r)).collect();
            }
        }

        Ok(ResultAggregator::assess(targets, &results))
    }

    /// Clear the degraded flag. Reconnecting the engine is up to the caller.
    pub async fn reset(&self, id: Uuid) -> Result<Session> {
        let handle = self.handle(id).await?;
        let mut session = self.lock(id, &handle).await?;
        if session.degraded {
            info!(session_id = %id, "Clearing degraded flag");
        }
        session.degraded = false;
        Ok(session.clone())
    }

    /// Request cooperative cancellation of the running operation. Returns
    /// whether one was running.
    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        let handle = self.handle(id).await?;
        let running = handle.session.try_lock().is_err();
        handle.cancel();
        info!(session_id = %id, running, "Cancellation requested");
        Ok(running)
    }

    /// Close the engine project and drop the session.
    pub async fn close(&self, id: Uuid) -> Result<()> {
        let handle = self.handle(id).await?;
        {
            let mut session = self.lock(id, &handle).await?;
            if session.phase != WorkflowPhase::Uninitialized && !session.degraded {
                let cancel = handle.arm();
                if let Err(e) = handle
                    .dispatcher
                    .dispatch(&mut session, &Operation::CloseProject, &cancel)
                    .await
                {
                    warn!(session_id = %id, error = %e, "Engine project did not close cleanly");
                }
            }
        }

        self.sessions.write().await.remove(&id);
        self.backends.release(id);
        info!(session_id = %id, "Session closed");
        self.event_bus.emit(Event::SessionClosed { session_id: id });
        Ok(())
    }

    pub async fn snapshot(&self, id: Uuid) -> Result<Session> {
        let handle = self.handle(id).await?;
        let session = self.lock(id, &handle).await?;
        Ok(session.clone())
    }

    pub async fn log(&self, id: Uuid) -> Result<Vec<OperationRecord>> {
        let handle = self.handle(id).await?;
        let session = self.lock(id, &handle).await?;
        Ok(session.log.clone())
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .iter()
            .map(|(id, handle)| match handle.session.try_lock() {
                Ok(session) => SessionSummary {
                    id: *id,
                    phase: Some(session.phase),
                    degraded: Some(session.degraded),
                    busy: false,
                },
                Err(_) => SessionSummary {
                    id: *id,
                    phase: None,
                    degraded: None,
                    busy: true,
                },
            })
            .collect();
        summaries.sort_by_key(|s| s.id);
        summaries
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn handle(&self, id: Uuid) -> Result<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(OrchestratorError::SessionNotFound(id))
    }

    async fn lock<'a>(
        &self,
        id: Uuid,
        handle: &'a SessionHandle,
    ) -> Result<MutexGuard<'a, Session>> {
        tokio::time::timeout(self.config.lock_timeout(), handle.session.lock())
            .await
            .map_err(|_| OrchestratorError::SessionBusy(id))
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("backend", &self.config.backend.name())
            .finish()
    }
}
