//! Ollama client
//!
//! Uses the non-streaming `/api/generate` endpoint. Usage counters live on
//! the client instance; construct one client and pass it down.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{LanguageModel, LlmError};
use crate::config::LlmConfig;

/// Usage counters of one client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    /// Rough estimate: prompt words plus twice the response words
    pub estimated_tokens: u64,
    pub last_request_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    stats: RwLock<UsageStats>,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            stats: RwLock::new(UsageStats::default()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Connectivity check; returns the server version
    pub async fn ping(&self) -> Result<String, LlmError> {
        let url = format!("{}/api/version", self.base_url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let version: VersionResponse = response.json().await?;
        info!("Connected to Ollama version {}", version.version);
        Ok(version.version)
    }

    pub async fn stats(&self) -> UsageStats {
        self.stats.read().await.clone()
    }

    pub async fn reset_stats(&self) {
        *self.stats.write().await = UsageStats::default();
    }

    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "system": system_prompt,
            "stream": false
        });

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &str, system_prompt: &str) -> Result<String, LlmError> {
        {
            let mut stats = self.stats.write().await;
            stats.total_requests += 1;
            stats.last_request_at = Some(Utc::now());
        }

        debug!(model = %self.model, prompt_len = prompt.len(), "Sending generate request");
        match self.generate(prompt, system_prompt).await {
            Ok(text) => {
                self.stats.write().await.estimated_tokens += estimate_tokens(prompt, &text);
                Ok(text)
            }
            Err(e) => {
                self.stats.write().await.failed_requests += 1;
                warn!("Model request failed: {e}");
                Err(e)
            }
        }
    }
}

fn estimate_tokens(prompt: &str, response: &str) -> u64 {
    let prompt_words = prompt.split_whitespace().count() as u64;
    let response_words = response.split_whitespace().count() as u64;
    prompt_words + response_words * 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> LlmConfig {
        LlmConfig {
            // Port 9 (discard) is closed on test machines
            base_url: "http://127.0.0.1:9/".to_string(),
            timeout_secs: 2,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("one two three", "a b"), 7);
        assert_eq!(estimate_tokens("", ""), 0);
    }

    #[test]
    fn test_base_url_is_normalised() {
        let client = OllamaClient::new(&unreachable_config()).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9");
        assert_eq!(client.model(), "qwen3");
    }

    #[tokio::test]
    async fn test_failed_request_is_counted_and_reset() {
        let client = OllamaClient::new(&unreachable_config()).unwrap();
        assert!(client.complete("hello", "system").await.is_err());

        let stats = client.stats().await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.estimated_tokens, 0);
        assert!(stats.last_request_at.is_some());

        client.reset_stats().await;
        assert_eq!(client.stats().await, UsageStats::default());
    }
}
