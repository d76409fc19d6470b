//! Best-effort reproduction plan
//!
//! Plans are accepted as any JSON object. Accessors read the common keys
//! leniently and ignore anything that does not have the expected shape.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A file the plan expects to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFileSpec {
    pub name: String,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestPlan(Map<String, Value>);

impl TestPlan {
    pub fn from_object(object: Map<String, Value>) -> Self {
        Self(object)
    }

    /// Fixed plan used when the model output cannot be recovered
    pub fn default_plan() -> Self {
        let value = json!({
            "testFiles": [
                {"name": "issue-test.ts", "purpose": "Main test file to reproduce the issue"},
                {"name": "setup.ts", "purpose": "Environment setup"}
            ],
            "environmentSetup": [
                "Install dependencies",
                "Configure test environment"
            ],
            "reproductionSteps": [
                "Set up the test environment",
                "Execute the reported scenario",
                "Capture the observed behavior"
            ],
            "verificationCriteria": [
                "The reported behavior is observed",
                "Error output matches the report"
            ],
            "requiredTools": ["Node.js", "TypeScript"],
            "testApproach": "Generic reproduction of the reported scenario"
        });
        match value {
            Value::Object(map) => Self(map),
            _ => Self(Map::new()),
        }
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn test_files(&self) -> Vec<TestFileSpec> {
        let Some(Value::Array(files)) = self.0.get("testFiles") else {
            return Vec::new();
        };
        files
            .iter()
            .filter_map(|f| match f {
                Value::String(name) => Some(TestFileSpec {
                    name: name.clone(),
                    purpose: None,
                }),
                Value::Object(o) => o.get("name").and_then(Value::as_str).map(|name| {
                    TestFileSpec {
                        name: name.to_string(),
                        purpose: o.get("purpose").and_then(Value::as_str).map(String::from),
                    }
                }),
                _ => None,
            })
            .collect()
    }

    pub fn environment_setup(&self) -> Vec<String> {
        self.string_list("environmentSetup")
    }

    pub fn reproduction_steps(&self) -> Vec<String> {
        self.string_list("reproductionSteps")
    }

    pub fn verification_criteria(&self) -> Vec<String> {
        self.string_list("verificationCriteria")
    }

    pub fn tools(&self) -> Vec<String> {
        self.string_list("requiredTools")
    }

    pub fn approach(&self) -> Option<&str> {
        self.0.get("testApproach").and_then(Value::as_str)
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl Default for TestPlan {
    fn default() -> Self {
        Self::default_plan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_is_populated() {
        let plan = TestPlan::default_plan();
        assert_eq!(plan.test_files().len(), 2);
        assert!(!plan.reproduction_steps().is_empty());
        assert!(plan.approach().is_some());
    }

    #[test]
    fn test_lenient_accessors() {
        let object = json!({
            "testFiles": ["a.ts", {"name": "b.ts"}, 42, {"purpose": "no name"}],
            "reproductionSteps": ["one", 2, "three"],
            "testApproach": 7
        });
        let Value::Object(map) = object else { unreachable!() };
        let plan = TestPlan::from_object(map);

        let names: Vec<_> = plan.test_files().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["a.ts", "b.ts"]);
        assert_eq!(plan.reproduction_steps(), vec!["one", "three"]);
        assert_eq!(plan.approach(), None);
        assert!(plan.tools().is_empty());
    }
}
