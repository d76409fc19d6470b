//! Configuration Management
//!
//! TOML file, then environment overrides, then validation. Every section
//! has defaults so an empty (or missing) file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `ollama` or `stub`
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "qwen3".to_string(),
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("reprodesk.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// `fs` or `http`
    pub backend: String,
    pub root: PathBuf,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: "fs".to_string(),
            root: PathBuf::from("./artifacts"),
            endpoint: None,
            bucket: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReproductionConfig {
    pub work_root: PathBuf,
    /// External project cloned into every working directory
    pub project_url: Option<String>,
    pub command: String,
    pub args: Vec<String>,
    pub main_file: String,
    pub setup_file: String,
    pub timeout_secs: u64,
    pub env: BTreeMap<String, String>,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("NODE_ENV".to_string(), "test".to_string());
        Self {
            work_root: PathBuf::from("./temp"),
            project_url: None,
            command: "ts-node".to_string(),
            args: Vec::new(),
            main_file: "issue-test.ts".to_string(),
            setup_file: "setup.ts".to_string(),
            timeout_secs: 60,
            env,
        }
    }
}

impl ReproductionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub maintainer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub examples_dir: PathBuf,
    pub report_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            examples_dir: PathBuf::from("./demos"),
            report_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub blob: BlobConfig,
    pub reproduction: ReproductionConfig,
    pub escalation: EscalationConfig,
    pub harness: HarnessConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from `path` (if given and present), apply env overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if p.exists() => {
                info!("Loading configuration from {}", p.display());
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text)?
            }
            Some(p) => {
                debug!("Config file {} not found, using defaults", p.display());
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from an environment-like lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OLLAMA_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("OLLAMA_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("REPRODESK_PROJECT_URL") {
            self.reproduction.project_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("REPRODESK_MAINTAINER_ID") {
            self.escalation.maintainer_id = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("REPRODESK_WORK_ROOT") {
            self.reproduction.work_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("REPRODESK_DB") {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("REPRODESK_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("TEST_EXAMPLES_DIR") {
            self.harness.examples_dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.llm.provider.as_str() {
            "ollama" | "stub" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown llm provider '{other}'"
                )))
            }
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Invalid("llm.timeout_secs must be > 0".into()));
        }
        if self.reproduction.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "reproduction.timeout_secs must be > 0".into(),
            ));
        }
        if self.reproduction.command.trim().is_empty() {
            return Err(ConfigError::Invalid("reproduction.command is empty".into()));
        }
        match self.blob.backend.as_str() {
            "fs" => {}
            "http" => {
                if self.blob.endpoint.is_none() || self.blob.bucket.is_none() {
                    return Err(ConfigError::Invalid(
                        "http blob backend needs endpoint and bucket".into(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown blob backend '{other}'"
                )))
            }
        }
        Ok(())
    }
}
