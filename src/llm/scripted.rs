//! Deterministic language model for tests and offline runs
//!
//! Replies are chosen by the first matching rule, otherwise by the
//! fallback reply. Every call is recorded.

use async_trait::async_trait;
use std::sync::Mutex;

use super::prompts;
use super::{LanguageModel, LlmError};

/// Which pipeline prompt a call belongs to, derived from its system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Analysis,
    FollowUp,
    Plan,
    TestCode,
    Summary,
}

impl PromptKind {
    pub fn of(system_prompt: &str) -> Option<Self> {
        match system_prompt {
            s if s == prompts::ANALYSIS_SYSTEM => Some(PromptKind::Analysis),
            s if s == prompts::FOLLOW_UP_SYSTEM => Some(PromptKind::FollowUp),
            s if s == prompts::PLAN_SYSTEM => Some(PromptKind::Plan),
            s if s == prompts::TEST_CODE_SYSTEM => Some(PromptKind::TestCode),
            s if s == prompts::SUMMARY_SYSTEM => Some(PromptKind::Summary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    Text(String),
    Fail(String),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        ScriptedReply::Fail(reason.into())
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Kind(PromptKind),
    PromptContains(String),
}

impl Matcher {
    fn matches(&self, prompt: &str, system_prompt: &str) -> bool {
        match self {
            Matcher::Kind(kind) => PromptKind::of(system_prompt) == Some(*kind),
            Matcher::PromptContains(needle) => prompt.contains(needle.as_str()),
        }
    }
}

/// A call received by the scripted model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: Option<PromptKind>,
    pub prompt: String,
    pub system_prompt: String,
}

pub struct ScriptedModel {
    rules: Vec<(Matcher, ScriptedReply)>,
    fallback: ScriptedReply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    /// No rules; every call fails until rules are added
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: ScriptedReply::fail("no scripted reply"),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply to every call of the given kind
    pub fn on(mut self, kind: PromptKind, reply: ScriptedReply) -> Self {
        self.rules.push((Matcher::Kind(kind), reply));
        self
    }

    /// Reply to every call whose user prompt contains `needle`
    ///
    /// Checked in insertion order together with [`ScriptedModel::on`] rules.
    pub fn on_prompt_containing(mut self, needle: impl Into<String>, reply: ScriptedReply) -> Self {
        self.rules.push((Matcher::PromptContains(needle.into()), reply));
        self
    }

    pub fn otherwise(mut self, reply: ScriptedReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Valid output for every pipeline prompt
    pub fn canned() -> Self {
        Self::new()
            .on(
                PromptKind::Analysis,
                ScriptedReply::text(
                    r#"{
  "problemCategory": "bug",
  "projectComponent": "core",
  "estimatedComplexity": "medium",
  "requiredTools": ["node", "ts-node"],
  "potentialSolutions": ["add a regression test around the reported path"],
  "reproducibilitySteps": ["install the project", "run the reported scenario"]
}"#,
                ),
            )
            .on(
                PromptKind::FollowUp,
                ScriptedReply::text(
                    r#"["Which version are you running?", "Does it happen on a clean install?"]"#,
                ),
            )
            .on(
                PromptKind::Plan,
                ScriptedReply::text(
                    r#"{
  "testFiles": [{"name": "issue-test.ts", "purpose": "reproduce the report"}],
  "environmentSetup": ["install dependencies"],
  "reproductionSteps": ["run the reported scenario"],
  "verificationCriteria": ["the reported error is printed"],
  "requiredTools": ["ts-node"],
  "testApproach": "minimal script exercising the reported path"
}"#,
                ),
            )
            .on(
                PromptKind::TestCode,
                ScriptedReply::text(
                    r#"{"mainTest": "import { setupTest } from './setup';\nsetupTest();\nconsole.log('issue not observed');\nprocess.exit(1);\n", "setup": "export function setupTest() {\n  console.log('setup');\n}\n"}"#,
                ),
            )
            .on(
                PromptKind::Summary,
                ScriptedReply::text(
                    "The issue could not be reproduced automatically. The test script ran to completion without observing the reported behavior.",
                ),
            )
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_of(&self, kind: PromptKind) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.kind == Some(kind))
            .count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str, system_prompt: &str) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                kind: PromptKind::of(system_prompt),
                prompt: prompt.to_string(),
                system_prompt: system_prompt.to_string(),
            });
        }

        let reply = self
            .rules
            .iter()
            .find(|(matcher, _)| matcher.matches(prompt, system_prompt))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.fallback);

        match reply {
            ScriptedReply::Text(text) => Ok(text.clone()),
            ScriptedReply::Fail(reason) => Err(LlmError::Unavailable(reason.clone())),
        }
    }
}
