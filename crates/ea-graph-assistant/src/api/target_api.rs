// Active datastore target: inspect and switch
use axum::extract::{Json, State};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::{error_response, ok, validation_error, ApiResult};
use crate::app_state::AppState;
use crate::error::AssistantError;
use crate::target::DatastoreTarget;

const ROUTE: &str = "/target";

#[derive(Debug, Deserialize, Validate)]
pub struct TargetRequest {
    #[validate(length(min = 1))]
    pub target: String,
}

#[derive(Debug, Serialize)]
pub struct TargetResponse {
    pub target: Option<DatastoreTarget>,
}

pub async fn get_target(State(state): State<AppState>) -> ApiResult<TargetResponse> {
    ok(ROUTE, TargetResponse { target: state.manager.current_target() })
}

pub async fn set_target(
    State(state): State<AppState>,
    Json(req): Json<TargetRequest>,
) -> ApiResult<TargetResponse> {
    req.validate().map_err(|e| validation_error(ROUTE, e))?;
    let target: DatastoreTarget = req
        .target
        .parse()
        .map_err(|e: String| error_response(ROUTE, AssistantError::InvalidInput(e)))?;

    info!("Target switch requested: {}", target);
    state
        .manager
        .ensure_active(target)
        .await
        .map_err(|e| error_response(ROUTE, e))?;
    ok(ROUTE, TargetResponse { target: state.manager.current_target() })
}
