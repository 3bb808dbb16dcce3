//! API module - HTTP boundary over the assistant core
//!
//! Handlers are thin: validate the body, call one core operation, map the
//! outcome. `AssistantError`s are recovered here and nowhere else.

pub mod health_api;
pub mod import_api;
pub mod query_api;
pub mod reset_api;
pub mod session_api;
pub mod target_api;

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::{error, warn};
use validator::ValidationErrors;

use crate::error::AssistantError;
use crate::metrics;

pub use health_api::{healthz, metrics_text, HealthResponse};
pub use import_api::{import_graph, ImportRequest};
pub use query_api::{query, QueryRequest, QueryResponse};
pub use reset_api::reset_workspace;
pub use session_api::{reset_session, SessionResetResponse};
pub use target_api::{get_target, set_target, TargetRequest, TargetResponse};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batches: Option<u32>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn status_for(err: &AssistantError) -> StatusCode {
    match err {
        AssistantError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AssistantError::WrongTarget { .. } => StatusCode::CONFLICT,
        AssistantError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
        AssistantError::Backend(_)
        | AssistantError::Protocol(_)
        | AssistantError::ConnectFailed { .. }
        | AssistantError::Generation(_)
        | AssistantError::TranslationEmpty
        | AssistantError::NarrationEmpty => StatusCode::BAD_GATEWAY,
        AssistantError::BatchLimitExceeded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Maps a core failure to its structured response and records it.
pub fn error_response(route: &str, err: AssistantError) -> ApiError {
    let status = status_for(&err);
    if err.is_client_error() {
        warn!("{} rejected: {}", route, err);
    } else {
        error!("{} failed: {}", route, err);
    }
    metrics::inc_request(route, status.as_str());

    let (deleted, batches) = match &err {
        AssistantError::BatchLimitExceeded { deleted, batches } => (Some(*deleted), Some(*batches)),
        _ => (None, None),
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind(),
            deleted,
            batches,
        }),
    )
}

pub fn validation_error(route: &str, errors: ValidationErrors) -> ApiError {
    error_response(route, AssistantError::InvalidInput(errors.to_string()))
}

pub fn ok<T>(route: &str, body: T) -> ApiResult<T> {
    metrics::inc_request(route, StatusCode::OK.as_str());
    Ok(Json(body))
}
