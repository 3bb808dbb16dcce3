// Model import: merge an uploaded file into the workspace datastore
use axum::extract::{Json, State};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use super::{error_response, ok, validation_error, ApiResult};
use crate::app_state::AppState;
use crate::import::ImportOutcome;
use crate::target::DatastoreTarget;

const ROUTE: &str = "/import";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
}

pub async fn import_graph(
    State(state): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> ApiResult<ImportOutcome> {
    req.validate().map_err(|e| validation_error(ROUTE, e))?;
    info!("Import requested for {}", req.file_name);

    state
        .manager
        .ensure_active(DatastoreTarget::Workspace)
        .await
        .map_err(|e| error_response(ROUTE, e))?;

    match state.importer.import(&req.file_name).await {
        Ok(outcome) => ok(ROUTE, outcome),
        Err(e) => Err(error_response(ROUTE, e)),
    }
}
