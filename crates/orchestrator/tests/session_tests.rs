use std::sync::Arc;
use std::time::Duration;

use events::EventBus;
use orchestrator::engine::EngineFault;
use orchestrator::{
    AmineTreaterScenario, FallbackSettings, Operation, OrchestratorConfig, OrchestratorError,
    ScenarioCase, SessionManager, SimulatedBackends,
};
use procflow_core::{BlockKind, WorkflowPhase};
use tempfile::TempDir;

fn config(dir: &TempDir) -> OrchestratorConfig {
    OrchestratorConfig::new(dir.path())
        .with_backoff_base(Duration::from_millis(5))
        .with_fallback(FallbackSettings {
            max_attempts: 3,
            verify_wait_ms: 1,
            step_timeout_ms: 1_000,
        })
}

/// Runs the scenario's build steps up to, not including, `stop_at`.
async fn build_until(manager: &SessionManager, id: uuid::Uuid, stop_at: &str) {
    for operation in AmineTreaterScenario::new(ScenarioCase::Base).build_operations() {
        if operation.name() == stop_at {
            return;
        }
        manager.dispatch(id, &operation).await.unwrap();
    }
}

#[tokio::test]
async fn test_simulation_before_flash_is_sequence_error() {
    let dir = TempDir::new().unwrap();
    let backends = Arc::new(SimulatedBackends::new());
    let manager = SessionManager::new(config(&dir), backends.clone(), EventBus::new()).unwrap();
    let (id, _) = manager.create_session().await.unwrap();
    build_until(&manager, id, "flash_stream").await;

    let engine = backends.engine_for(id).unwrap();
    let solves = engine.call_count("solve");
    let err = manager.dispatch(id, &Operation::RunSimulation).await.unwrap_err();

    match &err {
        OrchestratorError::Sequence { missing, .. } => {
            assert_eq!(missing.as_deref(), Some("flash_stream"));
        }
        other => panic!("expected sequence error, got {other:?}"),
    }
    assert_eq!(engine.call_count("solve"), solves);
    let session = manager.snapshot(id).await.unwrap();
    assert_eq!(session.phase, WorkflowPhase::CompositionSet);
}

#[tokio::test]
async fn test_transient_faults_are_retried() {
    let dir = TempDir::new().unwrap();
    let backends = Arc::new(SimulatedBackends::new());
    let manager = SessionManager::new(config(&dir), backends.clone(), EventBus::new()).unwrap();
    let (id, _) = manager.create_session().await.unwrap();

    let engine = backends.engine_for(id).unwrap();
    engine.inject_fault("add_flowsheet", EngineFault::transient("busy"));
    engine.inject_fault("add_flowsheet", EngineFault::transient("busy"));

    let response = manager
        .dispatch(
            id,
            &Operation::AddFlowsheet {
                name: "Amine Treating".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(response.attempts, 3);
    assert_eq!(response.phase, WorkflowPhase::FlowsheetCreated);
}

#[tokio::test(start_paused = true)]
async fn test_engine_timeout_degrades_session() {
    let dir = TempDir::new().unwrap();
    let backends = Arc::new(SimulatedBackends::new().with_latency(Duration::from_millis(200)));
    let config = config(&dir).with_engine_call_timeout(Duration::from_millis(50));
    let manager = SessionManager::new(config, backends, EventBus::new()).unwrap();

    let err = manager.create_session().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::EngineUnresponsive { .. }));
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_session_refuses_until_reset() {
    let dir = TempDir::new().unwrap();
    let backends = Arc::new(SimulatedBackends::new());
    let manager = SessionManager::new(config(&dir), backends.clone(), EventBus::new()).unwrap();
    let (id, _) = manager.create_session().await.unwrap();

    backends
        .engine_for(id)
        .unwrap()
        .inject_fault("add_flowsheet", EngineFault::disconnected("bridge went away"));
    let flowsheet = Operation::AddFlowsheet {
        name: "Amine Treating".to_string(),
    };

    let err = manager.dispatch(id, &flowsheet).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::EngineUnresponsive { .. }));

    let err = manager.dispatch(id, &flowsheet).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::SessionDegraded(_)));

    let session = manager.reset(id).await.unwrap();
    assert!(!session.degraded);
    manager.dispatch(id, &flowsheet).await.unwrap();
}

#[tokio::test]
async fn test_fallback_exhaustion_leaves_phase() {
    let dir = TempDir::new().unwrap();
    let backends = Arc::new(
        SimulatedBackends::new()
            .with_unsupported(vec![BlockKind::AmineTreater])
            .with_frozen_screen(),
    );
    let manager = SessionManager::new(config(&dir), backends, EventBus::new()).unwrap();
    let (id, _) = manager.create_session().await.unwrap();
    build_until(&manager, id, "create_block").await;

    let before = manager.snapshot(id).await.unwrap();
    let err = manager
        .dispatch(
            id,
            &Operation::CreateBlock {
                kind: BlockKind::AmineTreater,
                name: "301-E".to_string(),
            },
        )
        .await
        .unwrap_err();

    match err {
        OrchestratorError::FallbackExhausted { step, attempts, .. } => {
            assert_eq!(step, 1);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected fallback exhaustion, got {other:?}"),
    }

    let after = manager.snapshot(id).await.unwrap();
    assert_eq!(after.phase, before.phase);
    assert!(after.blocks.is_empty());
    assert!(!after.degraded);
}

#[tokio::test]
async fn test_sessions_do_not_share_state() {
    let dir = TempDir::new().unwrap();
    let manager = SessionManager::new(
        config(&dir),
        Arc::new(SimulatedBackends::new()),
        EventBus::new(),
    )
    .unwrap();
    let (a, _) = manager.create_session().await.unwrap();
    let (b, _) = manager.create_session().await.unwrap();

    build_until(&manager, a, "create_block").await;

    assert_eq!(
        manager.snapshot(a).await.unwrap().phase,
        WorkflowPhase::ComponentsConfigured
    );
    assert_eq!(
        manager.snapshot(b).await.unwrap().phase,
        WorkflowPhase::ProjectCreated
    );
}
