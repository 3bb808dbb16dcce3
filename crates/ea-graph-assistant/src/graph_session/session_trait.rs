use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AssistantError, AssistantResult};
use crate::target::DatastoreTarget;

/// One decoded result row: column name → value, in backend column order.
pub type Row = Map<String, Value>;

/// Bound query parameters.
pub type Params = Map<String, Value>;

/// How to reach one datastore target.
#[derive(Clone)]
pub struct TargetConfig {
    pub target: DatastoreTarget,
    /// Executable of the stdio tool server fronting the database.
    pub command: String,
    pub args: Vec<String>,
    pub uri: String,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub extra_env: HashMap<String, String>,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("target", &self.target)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TargetConfigs {
    pub primary: TargetConfig,
    pub workspace: TargetConfig,
}

impl TargetConfigs {
    pub fn get(&self, target: DatastoreTarget) -> &TargetConfig {
        match target {
            DatastoreTarget::Primary => &self.primary,
            DatastoreTarget::Workspace => &self.workspace,
        }
    }
}

/// A live session against one graph backend.
#[async_trait]
pub trait GraphSession: Send + Sync {
    fn target(&self) -> DatastoreTarget;

    async fn read(&self, query: &str, params: &Params) -> AssistantResult<Vec<Row>>;

    async fn write(&self, query: &str, params: &Params) -> AssistantResult<Vec<Row>>;

    /// Releases the backend. Must be safe to call more than once.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Opens sessions. The connection manager owns the only factory.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn connect(&self, config: &TargetConfig) -> anyhow::Result<Arc<dyn GraphSession>>;
}

/// Decodes a text-encoded JSON payload into rows.
///
/// An array of objects is a row set, a lone object is a single row (write
/// summaries come back that way) and blank text is an empty result.
pub fn decode_rows(text: &str) -> AssistantResult<Vec<Row>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|e| {
        AssistantError::Protocol(format!("payload is not JSON ({}): {}", e, preview(trimmed)))
    })?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(row) => Ok(row),
                other => Err(AssistantError::Protocol(format!(
                    "row {} is not an object: {}",
                    i,
                    preview(&other.to_string())
                ))),
            })
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        other => Err(AssistantError::Protocol(format!(
            "expected rows, got {}",
            preview(&other.to_string())
        ))),
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut end = MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
