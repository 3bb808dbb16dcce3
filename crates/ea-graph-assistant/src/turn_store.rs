//! Per-session conversation memory: the single most recent turn.

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub user_text: String,
    pub agent_text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(user_text: impl Into<String>, agent_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            agent_text: agent_text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Context block prepended to the next translation request.
    pub fn render_context(&self) -> String {
        format!(
            "Previous turn:\nUser: {}\nAssistant: {}",
            self.user_text, self.agent_text
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnCacheConfig {
    pub capacity: u64,
    pub idle_seconds: u64,
}

impl Default for TurnCacheConfig {
    fn default() -> Self {
        Self { capacity: 10_000, idle_seconds: 3600 }
    }
}

pub trait TurnStore: Send + Sync {
    fn last_turn(&self, session_id: &str) -> Option<Turn>;
    fn record(&self, session_id: &str, turn: Turn);
    fn forget(&self, session_id: &str);
}

/// Bounded in-process store; entries are evicted by capacity and idle time.
#[derive(Clone)]
pub struct InMemoryTurnStore {
    turns: Cache<String, Turn>,
}

impl InMemoryTurnStore {
    pub fn new(config: &TurnCacheConfig) -> Self {
        Self {
            turns: Cache::builder()
                .max_capacity(config.capacity)
                .time_to_idle(Duration::from_secs(config.idle_seconds))
                .build(),
        }
    }
}

impl Default for InMemoryTurnStore {
    fn default() -> Self {
        Self::new(&TurnCacheConfig::default())
    }
}

impl TurnStore for InMemoryTurnStore {
    fn last_turn(&self, session_id: &str) -> Option<Turn> {
        self.turns.get(session_id)
    }

    fn record(&self, session_id: &str, turn: Turn) {
        self.turns.insert(session_id.to_string(), turn);
    }

    fn forget(&self, session_id: &str) {
        self.turns.invalidate(session_id);
    }
}
