use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use events::EventBus;
use orchestrator::engine::EngineFault;
use orchestrator::{AmineTreaterScenario, OrchestratorConfig, ScenarioCase, SessionManager, SimulatedBackends};
use serde_json::{json, Value};
use server::{create_router, state::AppState};
use tempfile::TempDir;
use uuid::Uuid;

struct Harness {
    server: TestServer,
    backends: Arc<SimulatedBackends>,
    _dir: TempDir,
}

fn setup_test_server() -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = OrchestratorConfig::new(dir.path().join("projects"))
        .with_backoff_base(Duration::from_millis(5))
        .with_engine_call_timeout(Duration::from_secs(2));
    let backends = Arc::new(SimulatedBackends::new());
    let manager = SessionManager::new(config, backends.clone(), EventBus::new())
        .expect("Failed to build session manager");

    let server = TestServer::new(create_router(AppState::new(manager)))
        .expect("Failed to create test server");

    Harness {
        server,
        backends,
        _dir: dir,
    }
}

async fn create_session(server: &TestServer) -> Uuid {
    let response = server.post("/api/sessions").await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = response.json();
    body["session_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("session_id in response")
}

fn operations_path(id: Uuid) -> String {
    format!("/api/sessions/{}/operations", id)
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = setup_test_server();

    let response = h.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "simulated");
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let h = setup_test_server();

    let response = h.server.get("/api/openapi.json").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert!(body["paths"]["/api/sessions/{id}/operations"].is_object());
}

#[tokio::test]
async fn test_create_and_get_session() {
    let h = setup_test_server();
    let id = create_session(&h.server).await;

    let response = h.server.get(&format!("/api/sessions/{}", id)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["phase"], "project_created");
    assert_eq!(body["degraded"], false);

    let list: Value = h.server.get("/api/sessions").await.json();
    assert_eq!(list.as_array().map(|l| l.len()), Some(1));
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let h = setup_test_server();

    let response = h
        .server
        .get(&format!("/api/sessions/{}", Uuid::new_v4()))
        .await;
    response.assert_status_not_found();

    let body: Value = response.json();
    assert_eq!(body["error"], "session_not_found");
}

#[tokio::test]
async fn test_out_of_order_operation_is_409_with_suggestion() {
    let h = setup_test_server();
    let id = create_session(&h.server).await;

    let response = h
        .server
        .post(&operations_path(id))
        .json(&json!({"op": "run_simulation"}))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);

    let body: Value = response.json();
    assert_eq!(body["error"], "sequence_error");
    assert!(body["suggestion"].as_str().is_some());
}

#[tokio::test]
async fn test_duplicate_name_is_422() {
    let h = setup_test_server();
    let id = create_session(&h.server).await;

    for op in [
        json!({"op": "add_flowsheet", "name": "Main"}),
        json!({"op": "add_components", "components": "Water, MDEA"}),
        json!({"op": "create_stream", "name": "S1"}),
    ] {
        h.server.post(&operations_path(id)).json(&op).await.assert_status_ok();
    }

    let response = h
        .server
        .post(&operations_path(id))
        .json(&json!({"op": "create_stream", "name": "S1"}))
        .await;
    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error"], "duplicate_name");
}

#[tokio::test]
async fn test_scenario_over_http_passes_assessment() {
    let h = setup_test_server();
    let id = create_session(&h.server).await;
    let scenario = AmineTreaterScenario::new(ScenarioCase::Base);

    for operation in scenario.build_operations() {
        h.server
            .post(&operations_path(id))
            .json(&operation)
            .await
            .assert_status_ok();
    }

    let response = h
        .server
        .post(&format!("/api/sessions/{}/assessment", id))
        .json(&json!({"targets": AmineTreaterScenario::targets()}))
        .await;
    response.assert_status_ok();
    let report: Value = response.json();
    assert_eq!(report["all_passed"], true);
    assert_eq!(report["summary"], "2/2 targets met");

    let log: Value = h.server.get(&format!("/api/sessions/{}/log", id)).await.json();
    let entries = log.as_array().map(|l| l.len()).unwrap_or_default();
    assert!(entries > scenario.build_operations().len());
}

#[tokio::test]
async fn test_empty_assessment_is_400() {
    let h = setup_test_server();
    let id = create_session(&h.server).await;

    let response = h
        .server
        .post(&format!("/api/sessions/{}/assessment", id))
        .json(&json!({"targets": []}))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_disconnect_degrades_until_reset() {
    let h = setup_test_server();
    let id = create_session(&h.server).await;
    let engine = h.backends.engine_for(id).expect("engine for session");
    engine.inject_fault("add_flowsheet", EngineFault::disconnected("bridge went away"));

    let flowsheet = json!({"op": "add_flowsheet", "name": "Main"});
    let response = h.server.post(&operations_path(id)).json(&flowsheet).await;
    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"], "engine_unresponsive");

    let response = h.server.post(&operations_path(id)).json(&flowsheet).await;
    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"], "session_degraded");

    let response = h.server.post(&format!("/api/sessions/{}/reset", id)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["degraded"], false);

    h.server
        .post(&operations_path(id))
        .json(&flowsheet)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_rejected_operation_is_502() {
    let h = setup_test_server();
    let id = create_session(&h.server).await;
    let engine = h.backends.engine_for(id).expect("engine for session");
    engine.inject_fault("add_flowsheet", EngineFault::rejected(7, "document is read-only"));

    let response = h
        .server
        .post(&operations_path(id))
        .json(&json!({"op": "add_flowsheet", "name": "Main"}))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"], "engine_rejected");
}

#[tokio::test]
async fn test_cancel_idle_session() {
    let h = setup_test_server();
    let id = create_session(&h.server).await;

    let response = h.server.post(&format!("/api/sessions/{}/cancel", id)).await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["was_running"], false);

    // A cancel with nothing running does not affect the next operation.
    h.server
        .post(&operations_path(id))
        .json(&json!({"op": "add_flowsheet", "name": "Main"}))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_delete_session() {
    let h = setup_test_server();
    let id = create_session(&h.server).await;

    h.server
        .delete(&format!("/api/sessions/{}", id))
        .await
        .assert_status(axum::http::StatusCode::NO_CONTENT);

    h.server
        .get(&format!("/api/sessions/{}", id))
        .await
        .assert_status_not_found();
}
