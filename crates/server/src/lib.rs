pub mod error;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "procflow API",
        version = "0.1.0",
        description = "Step-by-step construction and simulation of process flowsheets"
    ),
    paths(
        routes::health_check,
        routes::list_sessions,
        routes::create_session,
        routes::get_session,
        routes::delete_session,
        routes::dispatch_operation,
        routes::get_session_log,
        routes::assess_session,
        routes::reset_session,
        routes::cancel_session,
        routes::sse::events_stream,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::CreateSessionResponse,
        routes::AssessmentRequest,
        routes::CancelResponse,
        error::ErrorResponse,
        orchestrator::Operation,
        orchestrator::OperationOutput,
        orchestrator::OperationResponse,
        orchestrator::SpeciesList,
        orchestrator::SessionSummary,
        procflow_core::Session,
        procflow_core::OperationRecord,
        procflow_core::WorkflowPhase,
        procflow_core::Backend,
        procflow_core::PerformanceTarget,
        procflow_core::AssessmentReport,
        procflow_core::Assessment,
        procflow_core::AdjustmentSuggestion,
        events::EventEnvelope,
        events::Event,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session lifecycle endpoints"),
        (name = "operations", description = "Flowsheet operations and assessment"),
        (name = "events", description = "Real-time event streaming (SSE)"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route(
            "/api/sessions",
            get(routes::list_sessions).post(routes::create_session),
        )
        .route(
            "/api/sessions/{id}",
            get(routes::get_session).delete(routes::delete_session),
        )
        .route(
            "/api/sessions/{id}/operations",
            post(routes::dispatch_operation),
        )
        .route("/api/sessions/{id}/log", get(routes::get_session_log))
        .route("/api/sessions/{id}/assessment", post(routes::assess_session))
        .route("/api/sessions/{id}/reset", post(routes::reset_session))
        .route("/api/sessions/{id}/cancel", post(routes::cancel_session))
        .route("/api/events", get(routes::sse::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    tracing::info!(
        "Swagger UI available at http://{}/swagger-ui",
        listener.local_addr()?
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
