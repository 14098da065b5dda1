use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator::OrchestratorError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

pub fn status_for(err: &OrchestratorError) -> StatusCode {
    use OrchestratorError::*;

    match err {
        SessionNotFound(_) => StatusCode::NOT_FOUND,
        Sequence { .. } | SessionBusy(_) => StatusCode::CONFLICT,
        e if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
        SessionDegraded(_) | EngineUnresponsive { .. } => StatusCode::SERVICE_UNAVAILABLE,
        FallbackExhausted { .. }
        | EngineRejected { .. }
        | RecoverableEngine { .. }
        | UnsupportedOperation { .. }
        | Bridge(_) => StatusCode::BAD_GATEWAY,
        Cancelled { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "bad_request".to_string(),
                    message,
                    suggestion: None,
                },
            ),
            AppError::Orchestrator(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    tracing::error!(kind = err.kind(), "Request failed: {}", err);
                }
                (
                    status,
                    ErrorResponse {
                        error: err.kind().to_string(),
                        message: err.to_string(),
                        suggestion: err.suggestion(),
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
