// Workspace reset: switch to the workspace datastore, then delete in batches
use axum::extract::State;
use tracing::info;

use super::{error_response, ok, ApiResult};
use crate::app_state::AppState;
use crate::reset::ResetReport;
use crate::target::DatastoreTarget;

const ROUTE: &str = "/reset";

pub async fn reset_workspace(State(state): State<AppState>) -> ApiResult<ResetReport> {
    info!("Workspace reset requested");
    state
        .manager
        .ensure_active(DatastoreTarget::Workspace)
        .await
        .map_err(|e| error_response(ROUTE, e))?;

    match state.reset.reset().await {
        Ok(report) => ok(ROUTE, report),
        Err(e) => Err(error_response(ROUTE, e)),
    }
}
