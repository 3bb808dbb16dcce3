// Liveness and Prometheus scrape endpoints
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::app_state::AppState;
use crate::target::DatastoreTarget;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub model: String,
    pub target: Option<DatastoreTarget>,
}

pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        model: state.config.llm.model.clone(),
        target: state.manager.current_target(),
    })
}

pub async fn metrics_text() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        crate::metrics::render(),
    )
}
