//! Wiring of collaborators from configuration

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use reprodesk_core::Store;
use reprodesk_databases::{MemoryStore, SqliteStore};

use crate::blob::{self, BlobStore, MemoryBlobStore};
use crate::config::AppConfig;
use crate::exec::TokioProcessRunner;
use crate::intake::Intake;
use crate::llm::{LanguageModel, OllamaClient, ScriptedModel};
use crate::pipeline::{Investigator, InvestigatorSettings};

/// Everything a command needs to run investigations
pub struct Runtime {
    pub store: Arc<dyn Store>,
    pub model: Arc<dyn LanguageModel>,
    pub blobs: Arc<dyn BlobStore>,
    pub investigator: Arc<Investigator>,
}

impl Runtime {
    /// Build from configuration
    ///
    /// `offline` swaps in the in-memory store, in-memory blob store and the
    /// scripted model; child processes still run for real.
    pub fn build(config: &AppConfig, offline: bool) -> Result<Self> {
        let store: Arc<dyn Store> = if offline {
            Arc::new(MemoryStore::new())
        } else {
            let store = SqliteStore::open(&config.store.path).with_context(|| {
                format!("failed to open store at {}", config.store.path.display())
            })?;
            Arc::new(store)
        };

        let model: Arc<dyn LanguageModel> = if offline || config.llm.provider == "stub" {
            info!("Using scripted model");
            Arc::new(ScriptedModel::canned())
        } else {
            info!(model = %config.llm.model, url = %config.llm.base_url, "Using Ollama model");
            Arc::new(OllamaClient::new(&config.llm).context("failed to build model client")?)
        };

        let blobs: Arc<dyn BlobStore> = if offline {
            Arc::new(MemoryBlobStore::new())
        } else {
            Arc::from(blob::from_config(&config.blob).context("invalid blob configuration")?)
        };

        let investigator = Arc::new(Investigator::new(
            Arc::clone(&store),
            Arc::clone(&model),
            Arc::new(TokioProcessRunner::new()),
            Arc::clone(&blobs),
            InvestigatorSettings::from_config(config),
        ));

        Ok(Self {
            store,
            model,
            blobs,
            investigator,
        })
    }

    pub fn intake(&self) -> Intake {
        Intake::new(Arc::clone(&self.investigator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_runtime_uses_memory_store() {
        let runtime = Runtime::build(&AppConfig::default(), true).unwrap();
        assert!(runtime.store.list_active_issues().await.unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_runtime_opens_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.store.path = dir.path().join("issues.db");
        config.llm.provider = "stub".into();

        Runtime::build(&config, false).unwrap();
        assert!(config.store.path.exists());
    }
}
