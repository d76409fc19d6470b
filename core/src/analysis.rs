//! Structured analysis of a raw issue report

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Fixed set of report categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemCategory {
    Bug,
    FeatureRequest,
    ImplementationQuestion,
    Installation,
    Other,
}

impl ProblemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemCategory::Bug => "bug",
            ProblemCategory::FeatureRequest => "feature_request",
            ProblemCategory::ImplementationQuestion => "implementation_question",
            ProblemCategory::Installation => "installation",
            ProblemCategory::Other => "other",
        }
    }
}

/// Estimated effort to investigate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }
}

/// Reasons a decoded analysis is rejected
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis does not match schema: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("project component is empty")]
    EmptyComponent,

    #[error("required tool list is empty")]
    NoTools,

    #[error("potential solution list is empty")]
    NoSolutions,
}

/// Structured analysis produced from a raw report
///
/// Wire names follow the JSON the model is instructed to emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "problemCategory")]
    pub category: ProblemCategory,
    #[serde(rename = "projectComponent")]
    pub component: String,
    #[serde(rename = "estimatedComplexity")]
    pub complexity: Complexity,
    #[serde(rename = "requiredTools")]
    pub tools: Vec<String>,
    #[serde(rename = "potentialSolutions")]
    pub solutions: Vec<String>,
    #[serde(
        rename = "reproducibilitySteps",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reproduction_steps: Option<Vec<String>>,
    #[serde(
        rename = "additionalContext",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub context: Option<Map<String, Value>>,
}

impl AnalysisResult {
    /// Deterministic substitute for unusable model output
    pub fn fallback() -> Self {
        Self {
            category: ProblemCategory::Other,
            component: "unknown".to_string(),
            complexity: Complexity::Medium,
            tools: vec!["manual-investigation".to_string()],
            solutions: vec!["needs more information".to_string()],
            reproduction_steps: None,
            context: None,
        }
    }

    /// Decode a JSON value and validate it
    pub fn from_value(value: Value) -> Result<Self, AnalysisError> {
        let analysis: AnalysisResult = serde_json::from_value(value)?;
        analysis.validate()?;
        Ok(analysis)
    }

    /// Field-level checks serde cannot express
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.component.trim().is_empty() {
            return Err(AnalysisError::EmptyComponent);
        }
        if self.tools.is_empty() {
            return Err(AnalysisError::NoTools);
        }
        if self.solutions.is_empty() {
            return Err(AnalysisError::NoSolutions);
        }
        Ok(())
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "problemCategory": "bug",
            "projectComponent": "auth",
            "estimatedComplexity": "high",
            "requiredTools": ["node"],
            "potentialSolutions": ["refresh the token before expiry"],
            "reproducibilitySteps": ["log in", "wait an hour"],
            "additionalContext": {"browser": "firefox"}
        })
    }

    #[test]
    fn test_accepts_valid_analysis() {
        let analysis = AnalysisResult::from_value(valid()).unwrap();
        assert_eq!(analysis.category, ProblemCategory::Bug);
        assert_eq!(analysis.complexity, Complexity::High);
        assert_eq!(analysis.reproduction_steps.as_ref().map(Vec::len), Some(2));
        assert!(analysis.context.is_some());
    }

    #[test]
    fn test_rejects_unknown_category() {
        let mut value = valid();
        value["problemCategory"] = json!("complaint");
        assert!(matches!(
            AnalysisResult::from_value(value),
            Err(AnalysisError::Schema(_))
        ));
    }

    #[test]
    fn test_rejects_empty_lists() {
        let mut value = valid();
        value["requiredTools"] = json!([]);
        assert!(matches!(
            AnalysisResult::from_value(value),
            Err(AnalysisError::NoTools)
        ));

        let mut value = valid();
        value["potentialSolutions"] = json!([]);
        assert!(matches!(
            AnalysisResult::from_value(value),
            Err(AnalysisError::NoSolutions)
        ));
    }

    #[test]
    fn test_rejects_misshapen_optional_fields() {
        let mut value = valid();
        value["reproducibilitySteps"] = json!("just run it");
        assert!(AnalysisResult::from_value(value).is_err());

        let mut value = valid();
        value["additionalContext"] = json!(["not", "a", "map"]);
        assert!(AnalysisResult::from_value(value).is_err());
    }

    #[test]
    fn test_fallback_is_valid() {
        let fallback = AnalysisResult::fallback();
        assert!(fallback.validate().is_ok());
        assert_eq!(fallback.category, ProblemCategory::Other);
        assert_eq!(fallback.component, "unknown");
        assert!(fallback.is_fallback());
    }
}
