//! Language model access
//!
//! Every call is a single self-contained request/response. Nothing is
//! retained between calls, so each prompt carries all the context it needs.

pub mod ollama;
pub mod prompts;
pub mod recovery;
pub mod scripted;

use async_trait::async_trait;
use thiserror::Error;

pub use ollama::{OllamaClient, UsageStats};
pub use recovery::{recover, Recovered, RecoveryError, RecoveryTier, Shape};
pub use scripted::{PromptKind, RecordedCall, ScriptedModel, ScriptedReply};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("model unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt` under `system_prompt`, returning the raw text
    async fn complete(&self, prompt: &str, system_prompt: &str) -> Result<String, LlmError>;
}
