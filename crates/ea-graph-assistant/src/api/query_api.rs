// Natural-language query endpoint: one full translate → execute → narrate round trip
use axum::extract::{Json, State};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::{error_response, ok, validation_error, ApiResult};
use crate::app_state::AppState;
use crate::error::AssistantError;
use crate::pipeline::QueryAnswer;
use crate::target::DatastoreTarget;

const ROUTE: &str = "/query";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 128))]
    pub session_id: Option<String>,
    #[validate(length(min = 1))]
    pub target: String,
    #[validate(length(min = 1, max = 16000))]
    pub question: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub answer: QueryAnswer,
}

/// Answers a question against the requested datastore. A missing session id
/// starts a new conversation.
pub async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<QueryResponse> {
    req.validate().map_err(|e| validation_error(ROUTE, e))?;
    let target: DatastoreTarget = req
        .target
        .parse()
        .map_err(|e: String| error_response(ROUTE, AssistantError::InvalidInput(e)))?;

    let session_id = req.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    info!("[{}] Query on {} target ({} chars)", session_id, target, req.question.len());

    match state.pipeline.answer(&session_id, target, &req.question).await {
        Ok(answer) => ok(ROUTE, QueryResponse { session_id, answer }),
        Err(e) => Err(error_response(ROUTE, e)),
    }
}
