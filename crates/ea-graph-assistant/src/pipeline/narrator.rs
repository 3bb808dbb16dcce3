//! Narrator: turns query rows into a short explanation for the user.

use std::sync::Arc;
use tracing::debug;

use crate::error::{AssistantError, AssistantResult};
use crate::graph_session::Row;
use crate::llm::TextGenerator;

pub const NARRATION_INSTRUCTIONS: &str = "\
You are an experienced enterprise architect mentoring a colleague.
Explain what the query result means for the question asked.
Keep it to one to six sentences; go longer only when the question is genuinely complex.
If the result is empty, say so plainly and suggest how the question could be refined.
Use light structure (short lists or bold terms) only when it helps readability.
Do not repeat the query or the raw JSON.";

#[derive(Clone)]
pub struct Narrator {
    generator: Arc<dyn TextGenerator>,
}

impl Narrator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn narrate(&self, question: &str, query: &str, rows: &[Row]) -> AssistantResult<String> {
        let content = narration_content(question, query, rows)?;
        let answer = self
            .generator
            .generate(NARRATION_INSTRUCTIONS, &content)
            .await?
            .ok_or(AssistantError::NarrationEmpty)?;

        let explanation = answer.trim();
        if explanation.is_empty() {
            return Err(AssistantError::NarrationEmpty);
        }
        debug!("Narration produced {} chars", explanation.len());
        Ok(explanation.to_string())
    }
}

fn narration_content(question: &str, query: &str, rows: &[Row]) -> AssistantResult<String> {
    let rows_json = serde_json::to_string(rows)
        .map_err(|e| AssistantError::Protocol(format!("rows are not serializable: {}", e)))?;
    let mut content = format!(
        "Question:\n{}\n\nQuery:\n{}\n\nRows (JSON):\n{}",
        question, query, rows_json
    );
    if rows.is_empty() {
        content.push_str("\n\nThe query returned no rows.");
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{row, ScriptedGenerator};
    use serde_json::json;

    #[tokio::test]
    async fn test_rows_reach_the_generator_as_json() {
        let generator = ScriptedGenerator::new([Some(" There are three application components. ")]);
        let narrator = Narrator::new(generator.clone());

        let rows = vec![row(json!({ "count": 3 }))];
        let text = narrator
            .narrate("How many applications?", "MATCH (a:ApplicationComponent) RETURN count(a) AS count", &rows)
            .await
            .unwrap();
        assert_eq!(text, "There are three application components.");

        let (system, user) = &generator.prompts()[0];
        assert_eq!(system, NARRATION_INSTRUCTIONS);
        assert!(user.contains(r#"[{"count":3}]"#));
        assert!(user.contains("RETURN count(a) AS count"));
        assert!(!user.contains("returned no rows"));
    }

    #[tokio::test]
    async fn test_empty_result_is_called_out() {
        let generator = ScriptedGenerator::new([Some("Nothing matched.")]);
        let narrator = Narrator::new(generator.clone());

        narrator.narrate("q", "MATCH (n:Missing) RETURN n", &[]).await.unwrap();
        assert!(generator.prompts()[0].1.contains("Rows (JSON):\n[]\n\nThe query returned no rows."));
    }

    #[tokio::test]
    async fn test_blank_answer_is_narration_empty() {
        for answer in [None, Some(""), Some(" \n\t")] {
            let narrator = Narrator::new(ScriptedGenerator::new([answer]));
            let err = narrator.narrate("q", "RETURN 1", &[]).await.unwrap_err();
            assert!(matches!(err, AssistantError::NarrationEmpty));
        }
    }
}
