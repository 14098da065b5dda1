use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use orchestrator::{Operation, OperationResponse, SessionSummary};
use procflow_core::{AssessmentReport, OperationRecord, PerformanceTarget, Session};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, ErrorResponse};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub response: OperationResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssessmentRequest {
    pub targets: Vec<PerformanceTarget>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CancelResponse {
    /// Whether an operation was running when the request arrived.
    pub was_running: bool,
}

#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, description = "All live sessions", body = Vec<SessionSummary>)
    ),
    tag = "sessions"
)]
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.manager.list().await)
}

#[utoipa::path(
    post,
    path = "/api/sessions",
    responses(
        (status = 201, description = "Session created with an empty project", body = CreateSessionResponse),
        (status = 502, description = "Engine could not create the project", body = ErrorResponse),
        (status = 503, description = "Engine unresponsive", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let (session_id, response) = state.manager.create_session().await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            response,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session snapshot", body = Session),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Session busy", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.manager.snapshot(id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/sessions/{id}",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 204, description = "Project closed and session dropped"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.manager.close(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/operations",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    request_body = Operation,
    responses(
        (status = 200, description = "Operation carried out", body = OperationResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Out of sequence or session busy", body = ErrorResponse),
        (status = 422, description = "Validation failed", body = ErrorResponse),
        (status = 502, description = "Engine or fallback failure", body = ErrorResponse),
        (status = 503, description = "Engine unresponsive or session degraded", body = ErrorResponse)
    ),
    tag = "operations"
)]
pub async fn dispatch_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(operation): Json<Operation>,
) -> Result<Json<OperationResponse>, AppError> {
    Ok(Json(state.manager.dispatch(id, &operation).await?))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/log",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Operations committed so far", body = Vec<OperationRecord>),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn get_session_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OperationRecord>>, AppError> {
    Ok(Json(state.manager.log(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/assessment",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    request_body = AssessmentRequest,
    responses(
        (status = 200, description = "Targets compared with stream results", body = AssessmentReport),
        (status = 400, description = "No targets given", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "No converged simulation yet", body = ErrorResponse)
    ),
    tag = "operations"
)]
pub async fn assess_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AssessmentRequest>,
) -> Result<Json<AssessmentReport>, AppError> {
    if request.targets.is_empty() {
        return Err(AppError::BadRequest("At least one target is required".to_string()));
    }
    Ok(Json(state.manager.assess(id, &request.targets).await?))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/reset",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Degraded flag cleared", body = Session),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.manager.reset(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 202, description = "Cancellation requested", body = CancelResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<CancelResponse>), AppError> {
    let was_running = state.manager.cancel(id).await?;
    Ok((StatusCode::ACCEPTED, Json(CancelResponse { was_running })))
}
