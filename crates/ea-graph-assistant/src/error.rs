//! Error taxonomy shared by every core component.
//!
//! Components never swallow these; they are recovered once, at the request
//! boundary, where [`AssistantError::is_client_error`] decides whether the
//! caller or the backend is to blame.

use thiserror::Error;

use crate::target::DatastoreTarget;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("no graph backend session is active")]
    NotConnected,

    #[error("graph backend rejected the query: {0}")]
    Backend(String),

    #[error("could not decode graph backend response: {0}")]
    Protocol(String),

    #[error("failed to connect to {target} datastore: {reason}")]
    ConnectFailed {
        target: DatastoreTarget,
        reason: String,
    },

    #[error("text generation service returned no query")]
    TranslationEmpty,

    #[error("text generation service returned no explanation")]
    NarrationEmpty,

    #[error("text generation request failed: {0}")]
    Generation(String),

    #[error("destructive operation requires the {required} datastore, but active target is {}", active.map(|t| t.to_string()).unwrap_or_else(|| "none".to_string()))]
    WrongTarget {
        active: Option<DatastoreTarget>,
        required: DatastoreTarget,
    },

    #[error("reset aborted after {batches} batches ({deleted} nodes deleted so far)")]
    BatchLimitExceeded { deleted: u64, batches: u32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AssistantError {
    /// Client-caused conditions; everything else is attributed to the server
    /// or one of its backends.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AssistantError::InvalidInput(_) | AssistantError::WrongTarget { .. }
        )
    }

    /// Stable machine-readable discriminant for structured failure responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantError::NotConnected => "not_connected",
            AssistantError::Backend(_) => "backend_error",
            AssistantError::Protocol(_) => "protocol_error",
            AssistantError::ConnectFailed { .. } => "connect_failed",
            AssistantError::TranslationEmpty => "translation_empty",
            AssistantError::NarrationEmpty => "narration_empty",
            AssistantError::Generation(_) => "generation_failed",
            AssistantError::WrongTarget { .. } => "wrong_target",
            AssistantError::BatchLimitExceeded { .. } => "batch_limit_exceeded",
            AssistantError::InvalidInput(_) => "invalid_input",
        }
    }
}

pub type AssistantResult<T> = Result<T, AssistantError>;
