//! Reproduction planning

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use reprodesk_core::{AnalysisResult, TestPlan};

use crate::llm::{prompts, recover, LanguageModel, Shape};

pub struct PlanStage {
    model: Arc<dyn LanguageModel>,
}

impl PlanStage {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Best-effort plan; never fails
    pub async fn plan(&self, report: &str, analysis: &AnalysisResult) -> TestPlan {
        match self
            .model
            .complete(&prompts::plan_prompt(report, analysis), prompts::PLAN_SYSTEM)
            .await
        {
            Ok(text) => parse_plan(&text),
            Err(e) => {
                warn!(stage = "plan", "Model call failed, using default plan: {e}");
                TestPlan::default_plan()
            }
        }
    }
}

/// Any JSON object is accepted as a plan
pub fn parse_plan(response: &str) -> TestPlan {
    match recover(response, Shape::Object) {
        Ok(recovered) => match recovered.value {
            Value::Object(map) => {
                info!(stage = "plan", tier = ?recovered.tier, "Test plan created");
                TestPlan::from_object(map)
            }
            _ => TestPlan::default_plan(),
        },
        Err(e) => {
            warn!(stage = "plan", "{e}, using default plan");
            TestPlan::default_plan()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_object_is_accepted() {
        let plan = parse_plan(r#"{"whatever": 1}"#);
        assert_eq!(plan.as_object().get("whatever"), Some(&serde_json::json!(1)));
        assert!(plan.test_files().is_empty());
    }

    #[test]
    fn test_unparseable_uses_default() {
        assert_eq!(parse_plan("I cannot help with that"), TestPlan::default_plan());
        assert_eq!(parse_plan(r#"["a"]"#), TestPlan::default_plan());
    }
}
