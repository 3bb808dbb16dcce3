//! Query Executor: routes a query to the read or write path of one bound
//! session and runs the two introspection reads the summarizer needs.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::AssistantResult;
use crate::graph_session::{GraphSession, Params, Row};

pub const SCHEMA_QUERY: &str = "CALL apoc.meta.schema() YIELD value RETURN value";
pub const INDEX_QUERY: &str = "SHOW INDEXES YIELD name, type, labelsOrTypes, properties";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    Read,
    Write,
}

/// Raw introspection results, in whatever shape the backend produced.
#[derive(Debug, Clone)]
pub struct RawSchema {
    pub schema: Value,
    pub indexes: Value,
}

/// Executes against the session it was built with. A request holds one
/// executor from introspection to the final query, so every stage sees the
/// same datastore.
#[derive(Clone)]
pub struct QueryExecutor {
    session: Arc<dyn GraphSession>,
}

impl QueryExecutor {
    pub fn new(session: Arc<dyn GraphSession>) -> Self {
        Self { session }
    }

    pub async fn execute(&self, intent: QueryIntent, query: &str, params: &Params) -> AssistantResult<Vec<Row>> {
        debug!("Executing {:?} query on {}: {}", intent, self.session.target(), query);
        match intent {
            QueryIntent::Read => self.session.read(query, params).await,
            QueryIntent::Write => self.session.write(query, params).await,
        }
    }

    pub async fn fetch_schema(&self) -> AssistantResult<RawSchema> {
        let schema = self.execute(QueryIntent::Read, SCHEMA_QUERY, &Params::new()).await?;
        let indexes = self.execute(QueryIntent::Read, INDEX_QUERY, &Params::new()).await?;
        Ok(RawSchema {
            schema: rows_to_value(schema),
            indexes: rows_to_value(indexes),
        })
    }
}

fn rows_to_value(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}
