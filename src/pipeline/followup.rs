//! Follow-up questions
//!
//! Questions are shown to the reporter while the investigation continues;
//! nothing waits for an answer.

use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use reprodesk_core::AnalysisResult;

use crate::llm::{prompts, recover, LanguageModel, Shape};

pub const DEFAULT_QUESTIONS: [&str; 3] = [
    "Could you provide more details about your setup?",
    "What steps have you already tried?",
    "Can you share any error messages you're seeing?",
];

pub fn default_questions() -> Vec<String> {
    DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

pub struct FollowUpStage {
    model: Arc<dyn LanguageModel>,
}

impl FollowUpStage {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn generate(&self, report: &str, analysis: &AnalysisResult) -> Vec<String> {
        match self
            .model
            .complete(
                &prompts::follow_up_prompt(report, analysis),
                prompts::FOLLOW_UP_SYSTEM,
            )
            .await
        {
            Ok(text) => parse_questions(&text),
            Err(e) => {
                warn!(stage = "follow_up", "Model call failed, using default questions: {e}");
                default_questions()
            }
        }
    }
}

/// A non-empty array of strings, or the default questions
pub fn parse_questions(response: &str) -> Vec<String> {
    let Ok(recovered) = recover(response, Shape::Array) else {
        warn!(stage = "follow_up", "No question array found, using defaults");
        return default_questions();
    };
    let Value::Array(items) = recovered.value else {
        return default_questions();
    };

    let questions: Option<Vec<String>> = items
        .into_iter()
        .map(|item| match item {
            Value::String(q) if !q.trim().is_empty() => Some(q),
            _ => None,
        })
        .collect();
    match questions {
        Some(q) if !q.is_empty() => q,
        _ => default_questions(),
    }
}

/// Numbered list shown to the reporter
pub fn render_questions(questions: &[String]) -> String {
    let list = questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {q}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "To better understand your issue, could you please answer these questions:\n\n{list}\n\n\
         I'll keep investigating in the meantime."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_questions() {
        assert_eq!(
            parse_questions(r#"Sure: ["Which OS?", "Which version?"]"#),
            vec!["Which OS?", "Which version?"]
        );
        assert_eq!(parse_questions(r#"["ok", 3]"#), default_questions());
        assert_eq!(parse_questions("[]"), default_questions());
        assert_eq!(parse_questions("nothing"), default_questions());
    }

    #[test]
    fn test_render_numbers_questions() {
        let text = render_questions(&["A?".to_string(), "B?".to_string()]);
        assert!(text.contains("1. A?\n2. B?"));
    }
}
