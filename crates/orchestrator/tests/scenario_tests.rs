use std::sync::Arc;
use std::time::Duration;

use events::EventBus;
use orchestrator::{
    run_scenario, AmineTreaterScenario, FallbackSettings, OrchestratorConfig, ScenarioCase,
    SessionManager, SimulatedBackends,
};
use procflow_core::{Backend, BlockKind, WorkflowPhase};
use tempfile::TempDir;

fn manager(dir: &TempDir, backends: SimulatedBackends) -> SessionManager {
    let config = OrchestratorConfig::new(dir.path().join("projects"))
        .with_backoff_base(Duration::from_millis(5))
        .with_fallback(FallbackSettings {
            max_attempts: 3,
            verify_wait_ms: 1,
            step_timeout_ms: 1_000,
        });
    SessionManager::new(config, Arc::new(backends), EventBus::new()).unwrap()
}

fn ppm(report: &procflow_core::AssessmentReport) -> f64 {
    report.assessments[0].observed.unwrap()
}

#[tokio::test]
async fn test_base_case_meets_targets() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir, SimulatedBackends::new());

    let report = run_scenario(&manager, ScenarioCase::Base, false).await.unwrap();

    assert!(report.outcome.as_ref().is_some_and(|o| o.converged));
    assert!(report.assessment.all_passed);
    assert_eq!(report.assessment.summary, "2/2 targets met");
    assert!(report.assessment.suggestions.is_empty());
    assert!(ppm(&report.assessment) < 100.0);
    assert!(report.rerun.is_none());
    assert!(report.steps.iter().all(|s| s.backend == Backend::Primary));

    let path = report.project_path.unwrap();
    assert!(path.exists());
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("pmx"));
}

#[tokio::test]
async fn test_high_loading_fails_with_amine_suggestion() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir, SimulatedBackends::new());

    let report = run_scenario(&manager, ScenarioCase::HighLoading, false)
        .await
        .unwrap();

    assert!(!report.assessment.all_passed);
    assert!(ppm(&report.assessment) > 100.0);
    let (suggestion, _) = AmineTreaterScenario::amine_flow_adjustment(&report.assessment)
        .expect("lean amine suggestion");
    assert!(suggestion.suggested_value > suggestion.current_value);
}

#[tokio::test]
async fn test_adjusted_rerun_lowers_slip() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir, SimulatedBackends::new());

    let report = run_scenario(&manager, ScenarioCase::HighLoading, true)
        .await
        .unwrap();

    let rerun = report.rerun.expect("re-run after failed assessment");
    assert!(rerun.outcome.as_ref().is_some_and(|o| o.converged));
    assert_eq!(rerun.steps[0].operation, "adjust_parameters");
    assert!(ppm(&rerun.assessment) < ppm(&report.assessment));

    let session = manager.snapshot(report.session_id).await.unwrap();
    assert!(session.phase >= WorkflowPhase::Solved);
}

#[tokio::test]
async fn test_unsupported_block_is_built_through_the_window() {
    let dir = TempDir::new().unwrap();
    let backends = SimulatedBackends::new().with_unsupported(vec![BlockKind::AmineTreater]);
    let manager = manager(&dir, backends);

    let report = run_scenario(&manager, ScenarioCase::Base, false).await.unwrap();

    let block_step = report
        .steps
        .iter()
        .find(|s| s.operation == "create_block")
        .unwrap();
    assert_eq!(block_step.backend, Backend::Fallback);
    assert!(report.assessment.all_passed);
}
