//! Report analysis

use std::sync::Arc;
use tracing::{debug, info, warn};

use reprodesk_core::AnalysisResult;

use crate::llm::{prompts, recover, LanguageModel, Shape};

pub struct AnalysisStage {
    model: Arc<dyn LanguageModel>,
}

impl AnalysisStage {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Structured analysis of `report`; never fails
    pub async fn analyze(&self, report: &str) -> AnalysisResult {
        let response = match self
            .model
            .complete(&prompts::analysis_prompt(report), prompts::ANALYSIS_SYSTEM)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(stage = "analysis", "Model call failed, using fallback: {e}");
                return AnalysisResult::fallback();
            }
        };
        parse_analysis(&response)
    }
}

/// Recover and validate an analysis, or return the fallback
pub fn parse_analysis(response: &str) -> AnalysisResult {
    let recovered = match recover(response, Shape::Object) {
        Ok(r) => r,
        Err(e) => {
            warn!(stage = "analysis", "{e}, using fallback");
            debug!(stage = "analysis", "Raw response: {response}");
            return AnalysisResult::fallback();
        }
    };

    match AnalysisResult::from_value(recovered.value) {
        Ok(analysis) => {
            info!(
                stage = "analysis",
                tier = ?recovered.tier,
                category = analysis.category.as_str(),
                complexity = analysis.complexity.as_str(),
                "Report analyzed"
            );
            analysis
        }
        Err(e) => {
            warn!(stage = "analysis", "Invalid analysis, using fallback: {e}");
            AnalysisResult::fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{PromptKind, ScriptedModel, ScriptedReply};
    use reprodesk_core::ProblemCategory;

    const VALID: &str = r#"{"problemCategory":"installation","projectComponent":"cli","estimatedComplexity":"low","requiredTools":["npm"],"potentialSolutions":["pin the node version"]}"#;

    #[test]
    fn test_direct_and_extracted() {
        assert_eq!(parse_analysis(VALID).category, ProblemCategory::Installation);
        let wrapped = format!("Here you go:\n{VALID}\nLet me know!");
        assert_eq!(parse_analysis(&wrapped).component, "cli");
    }

    #[test]
    fn test_invalid_inputs_fall_back() {
        for response in [
            "",
            "not json",
            "[1, 2, 3]",
            r#"{"problemCategory":"bug"}"#,
            r#"{"problemCategory":"bug","projectComponent":"x","estimatedComplexity":"extreme","requiredTools":["a"],"potentialSolutions":["b"]}"#,
            r#"{"problemCategory":"bug","projectComponent":"x","estimatedComplexity":"low","requiredTools":[],"potentialSolutions":["b"]}"#,
        ] {
            let analysis = parse_analysis(response);
            assert!(analysis.is_fallback(), "{response}");
            assert!(analysis.validate().is_ok());
        }
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let model = ScriptedModel::new().on(PromptKind::Analysis, ScriptedReply::fail("down"));
        let stage = AnalysisStage::new(Arc::new(model));
        let analysis = stage.analyze("it broke").await;
        assert_eq!(analysis.category, ProblemCategory::Other);
    }
}
