//! Query Translator: natural language plus schema summary in, one directly
//! executable Cypher query out.

use std::sync::Arc;
use tracing::debug;

use crate::error::{AssistantError, AssistantResult};
use crate::llm::TextGenerator;

const TRANSLATION_INSTRUCTIONS: &str = "\
You translate questions about an enterprise-architecture knowledge graph into Cypher for Neo4j 5.
Rules:
- Use only the node labels, relationship types and properties listed in the schema.
- When the relationship type between two elements is uncertain, use a bounded multi-hop pattern such as -[*1..3]- instead of guessing a type.
- When a relevant vector or full-text index exists, start from it (db.index.vector.queryNodes or db.index.fulltext.queryNodes) and refer to the user's search text as ${search_param}.
- Do not use syntax that Neo4j 5 rejects, such as exists(n.prop) or id(n) comparisons on element ids.
- Return the query itself: no explanation, no markdown fences, no wrapping in strings, EXPLAIN or PROFILE.
- A query that starts with an index CALL must end with a RETURN clause.";

/// Everything the translator sends for one request.
#[derive(Debug, Clone, Default)]
pub struct TranslationRequest<'a> {
    pub question: &'a str,
    pub schema_summary: &'a str,
    /// Rendered previous turn for the same session, if any.
    pub previous_turn: Option<&'a str>,
    /// Extra guidance for a second attempt.
    pub retry_hint: Option<&'a str>,
}

impl TranslationRequest<'_> {
    pub fn user_content(&self) -> String {
        let mut content = format!("Schema:\n{}\n", self.schema_summary.trim_end());
        if let Some(previous) = self.previous_turn {
            content.push_str(&format!("\n{}\n", previous));
        }
        if let Some(hint) = self.retry_hint {
            content.push_str(&format!("\n{}\n", hint));
        }
        content.push_str(&format!("\nQuestion:\n{}", self.question));
        content
    }
}

/// Fixed instruction prefix, naming the parameter the caller binds to the
/// raw user text.
pub fn translation_instructions(search_param: &str) -> String {
    TRANSLATION_INSTRUCTIONS.replace("{search_param}", search_param)
}

#[derive(Clone)]
pub struct QueryTranslator {
    generator: Arc<dyn TextGenerator>,
    instructions: String,
}

impl QueryTranslator {
    pub fn new(generator: Arc<dyn TextGenerator>, search_param: &str) -> Self {
        Self {
            generator,
            instructions: translation_instructions(search_param),
        }
    }

    pub async fn translate(&self, request: &TranslationRequest<'_>) -> AssistantResult<String> {
        let answer = self
            .generator
            .generate(&self.instructions, &request.user_content())
            .await?
            .ok_or(AssistantError::TranslationEmpty)?;

        let query = strip_code_fences(&answer);
        if query.is_empty() {
            return Err(AssistantError::TranslationEmpty);
        }
        debug!("Translated query: {}", query);
        Ok(query)
    }
}

const INLINE_FENCE_TAGS: [&str; 5] = ["cypher", "cql", "neo4j", "sql", "text"];

/// Returns the body of the first fenced block if the answer has one,
/// otherwise the trimmed answer. A language tag after the opening fence is
/// dropped, whether it sits on its own line or inline before the query.
pub fn strip_code_fences(answer: &str) -> String {
    let trimmed = answer.trim();
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let body = match after_fence.split_once('\n') {
            Some((first, rest)) if first.trim().is_empty() || is_fence_tag(first.trim()) => rest,
            _ => strip_inline_tag(after_fence),
        };
        let body = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
        return body.trim().to_string();
    }
    trimmed.to_string()
}

fn is_fence_tag(line: &str) -> bool {
    line.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'))
}

fn strip_inline_tag(body: &str) -> &str {
    match body.split_once(char::is_whitespace) {
        Some((word, rest)) if INLINE_FENCE_TAGS.contains(&word.to_ascii_lowercase().as_str()) => rest,
        _ => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    fn request<'a>(question: &'a str) -> TranslationRequest<'a> {
        TranslationRequest {
            question,
            schema_summary: "NODE LABELS\n  (:ApplicationComponent)\n",
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_translation_is_trimmed() {
        let generator = ScriptedGenerator::new([Some("  MATCH (a:ApplicationComponent) RETURN count(a) AS count \n")]);
        let translator = QueryTranslator::new(generator.clone(), "searchText");

        let query = translator.translate(&request("How many applications?")).await.unwrap();
        assert_eq!(query, "MATCH (a:ApplicationComponent) RETURN count(a) AS count");

        let (system, user) = &generator.prompts()[0];
        assert!(system.contains("as $searchText."));
        assert!(user.contains("(:ApplicationComponent)"));
        assert!(user.ends_with("Question:\nHow many applications?"));
    }

    #[tokio::test]
    async fn test_fenced_answer_is_unwrapped() {
        let generator = ScriptedGenerator::new([Some("Here you go:\n```cypher\nMATCH (n) RETURN n LIMIT 5\n```")]);
        let translator = QueryTranslator::new(generator, "searchText");

        let query = translator.translate(&request("Show five nodes")).await.unwrap();
        assert_eq!(query, "MATCH (n) RETURN n LIMIT 5");
    }

    #[tokio::test]
    async fn test_empty_answers_are_translation_empty() {
        for answer in [None, Some("   "), Some("```cypher\n```")] {
            let translator = QueryTranslator::new(ScriptedGenerator::new([answer]), "searchText");
            let err = translator.translate(&request("anything")).await.unwrap_err();
            assert!(matches!(err, AssistantError::TranslationEmpty));
        }
    }

    #[test]
    fn test_user_content_orders_context_before_question() {
        let req = TranslationRequest {
            question: "And which of those are retired?",
            schema_summary: "NODE LABELS\n",
            previous_turn: Some("Previous turn:\nUser: List applications"),
            retry_hint: Some("The previous query returned no rows."),
        };
        let content = req.user_content();
        let schema = content.find("Schema:").unwrap();
        let previous = content.find("Previous turn:").unwrap();
        let hint = content.find("returned no rows").unwrap();
        let question = content.find("Question:").unwrap();
        assert!(schema < previous && previous < hint && hint < question);
    }

    #[test]
    fn test_strip_code_fences_without_language_tag() {
        assert_eq!(strip_code_fences("```\nRETURN 1\n```"), "RETURN 1");
        assert_eq!(strip_code_fences("RETURN 1"), "RETURN 1");
        assert_eq!(strip_code_fences("```cypher\nRETURN 1"), "RETURN 1");
        assert_eq!(strip_code_fences("```RETURN 1```"), "RETURN 1");
    }

    #[test]
    fn test_strip_code_fences_drops_inline_language_tag() {
        assert_eq!(strip_code_fences("```cypher MATCH (n) RETURN n```"), "MATCH (n) RETURN n");
        assert_eq!(strip_code_fences("```Cypher MATCH (n) RETURN n\n```"), "MATCH (n) RETURN n");
        assert_eq!(strip_code_fences("```match (n) return n```"), "match (n) return n");
        assert_eq!(strip_code_fences("```MATCH (n)\nRETURN n\n```"), "MATCH (n)\nRETURN n");
    }
}
