use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Engine backend in use, `simulated` or `bridge`.
    pub backend: String,
    pub sessions: usize,
    pub events_published: usize,
    pub event_subscribers: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.manager.config().backend.name().to_string(),
        sessions: state.manager.session_count().await,
        events_published: state.event_bus.event_count(),
        event_subscribers: state.event_bus.subscriber_count(),
    })
}
