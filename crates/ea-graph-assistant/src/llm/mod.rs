//! Text-generation service seam.
//!
//! Translation and narration both go through [`TextGenerator`]; the service
//! is a black box that may legitimately answer with nothing.

pub mod client;

use async_trait::async_trait;
use std::fmt;

use crate::error::AssistantResult;

pub use client::ChatCompletionsClient;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns `Ok(None)` when the service produced no usable text.
    async fn generate(&self, system: &str, user: &str) -> AssistantResult<Option<String>>;
}

#[derive(Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    /// Nucleus sampling cutoff; left to the service default when unset.
    pub top_p: Option<f32>,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}
