//! Query pipeline
//!
//! One natural-language round trip:
//! validate → ensure target → introspect + summarize → translate (with the
//! session's previous turn) → execute read-only → optional retry on empty →
//! narrate → remember the turn.
//!
//! Nothing is recorded unless every stage succeeds. The whole round trip runs
//! on the session acquired for the requested target; if a concurrent switch
//! closes it, the request fails instead of answering from the other dataset.

pub mod executor;
pub mod narrator;
pub mod translator;

pub use executor::{QueryExecutor, QueryIntent, RawSchema, INDEX_QUERY, SCHEMA_QUERY};
pub use narrator::{Narrator, NARRATION_INSTRUCTIONS};
pub use translator::{strip_code_fences, translation_instructions, QueryTranslator, TranslationRequest};

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{AssistantError, AssistantResult};
use crate::graph_session::{ConnectionManager, Params, Row};
use crate::llm::TextGenerator;
use crate::metrics;
use crate::schema::SchemaSummarizer;
use crate::target::DatastoreTarget;
use crate::turn_store::{Turn, TurnStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Parameter the raw user text is bound to when a query references it.
    pub search_param: String,
    /// Re-translate once, with a hint, when the first query returns no rows.
    pub retry_on_empty: bool,
    pub max_question_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_param: "searchText".to_string(),
            retry_on_empty: false,
            max_question_chars: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnswer {
    pub explanation: String,
    pub query: String,
    pub params: Params,
    pub rows: Vec<Row>,
    pub target: DatastoreTarget,
}

pub struct QueryPipeline {
    manager: Arc<ConnectionManager>,
    summarizer: SchemaSummarizer,
    translator: QueryTranslator,
    narrator: Narrator,
    turns: Arc<dyn TurnStore>,
    search_pattern: Regex,
    config: PipelineConfig,
}

impl QueryPipeline {
    pub fn new(
        manager: Arc<ConnectionManager>,
        generator: Arc<dyn TextGenerator>,
        turns: Arc<dyn TurnStore>,
        summarizer: SchemaSummarizer,
        config: PipelineConfig,
    ) -> anyhow::Result<Self> {
        if config.search_param.is_empty()
            || !config.search_param.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            anyhow::bail!("search parameter name '{}' is not a valid identifier", config.search_param);
        }
        let search_pattern = Regex::new(&format!(r"\${}\b", regex::escape(&config.search_param)))?;

        Ok(Self {
            translator: QueryTranslator::new(generator.clone(), &config.search_param),
            narrator: Narrator::new(generator),
            manager,
            summarizer,
            turns,
            search_pattern,
            config,
        })
    }

    pub async fn answer(
        &self,
        session_id: &str,
        target: DatastoreTarget,
        question: &str,
    ) -> AssistantResult<QueryAnswer> {
        let question = self.validate_question(question)?;
        info!("[{}] Answering on {} target", session_id, target);

        let executor = QueryExecutor::new(self.manager.acquire(target).await?);

        let started = Instant::now();
        let raw = executor.fetch_schema().await?;
        let summary = self.summarizer.summarize(&raw.schema, &raw.indexes);
        metrics::observe_stage("schema", started.elapsed());
        debug!("[{}] Schema summary:\n{}", session_id, summary.text);

        let previous = self.turns.last_turn(session_id).map(|t| t.render_context());
        let request = TranslationRequest {
            question,
            schema_summary: &summary.text,
            previous_turn: previous.as_deref(),
            retry_hint: None,
        };
        let (mut query, mut params, mut rows) = self.translate_and_run(&executor, session_id, &request).await?;

        if rows.is_empty() && self.config.retry_on_empty {
            let hint = retry_hint(&query, &summary.labels);
            info!("[{}] Empty result, retrying translation once", session_id);
            let retry = TranslationRequest {
                retry_hint: Some(&hint),
                ..request.clone()
            };
            (query, params, rows) = self.translate_and_run(&executor, session_id, &retry).await?;
        }

        let started = Instant::now();
        let explanation = self.narrator.narrate(question, &query, &rows).await?;
        metrics::observe_stage("narrate", started.elapsed());

        self.turns.record(session_id, Turn::new(question, explanation.clone()));
        info!("[{}] Answered with {} rows", session_id, rows.len());

        Ok(QueryAnswer { explanation, query, params, rows, target })
    }

    fn validate_question<'q>(&self, question: &'q str) -> AssistantResult<&'q str> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AssistantError::InvalidInput("question must not be empty".to_string()));
        }
        if question.chars().count() > self.config.max_question_chars {
            return Err(AssistantError::InvalidInput(format!(
                "question exceeds {} characters",
                self.config.max_question_chars
            )));
        }
        Ok(question)
    }

    async fn translate_and_run(
        &self,
        executor: &QueryExecutor,
        session_id: &str,
        request: &TranslationRequest<'_>,
    ) -> AssistantResult<(String, Params, Vec<Row>)> {
        let started = Instant::now();
        let query = self.translator.translate(request).await?;
        metrics::observe_stage("translate", started.elapsed());
        info!("[{}] Generated query: {}", session_id, query);

        let params = self.bind_search_text(&query, request.question);

        let started = Instant::now();
        let rows = executor.execute(QueryIntent::Read, &query, &params).await?;
        metrics::observe_stage("execute", started.elapsed());
        debug!("[{}] Query returned {} rows", session_id, rows.len());

        Ok((query, params, rows))
    }

    /// Binds the raw user text when the query references the search
    /// placeholder as a whole word.
    pub fn bind_search_text(&self, query: &str, question: &str) -> Params {
        let mut params = Params::new();
        if self.search_pattern.is_match(query) {
            params.insert(self.config.search_param.clone(), Value::String(question.to_string()));
        }
        params
    }
}

fn mentions_label(query: &str, label: &str) -> bool {
    let needle = format!(":{}", label);
    query.match_indices(&needle).any(|(at, _)| {
        query[at + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    }) || query.contains(&format!(":`{}`", label))
}

fn retry_hint(failed_query: &str, labels: &[String]) -> String {
    let unused: Vec<&str> = labels
        .iter()
        .filter(|l| !mentions_label(failed_query, l))
        .map(String::as_str)
        .collect();

    let mut hint = format!(
        "An earlier attempt returned no rows:\n{}\nWrite a different query.",
        failed_query
    );
    if !unused.is_empty() {
        hint.push_str(&format!(" Consider labels it did not use: {}.", unused.join(", ")));
    }
    hint
}
