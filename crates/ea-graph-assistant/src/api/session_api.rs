// Conversation reset: drop the remembered turn for one session
use axum::extract::{Path, State};
use serde::Serialize;
use tracing::info;

use super::{error_response, ok, ApiResult};
use crate::app_state::AppState;
use crate::error::AssistantError;

const ROUTE: &str = "/session";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResetResponse {
    pub session_id: String,
    /// Whether a previous turn existed and was dropped.
    pub cleared: bool,
}

/// The next question in this session is translated without prior context.
pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResetResponse> {
    if session_id.trim().is_empty() || session_id.len() > 128 {
        return Err(error_response(
            ROUTE,
            AssistantError::InvalidInput("session id must be 1 to 128 characters".to_string()),
        ));
    }

    let cleared = state.turns.last_turn(&session_id).is_some();
    state.turns.forget(&session_id);
    info!("[{}] Conversation reset (had turn: {})", session_id, cleared);

    ok(ROUTE, SessionResetResponse { session_id, cleared })
}
