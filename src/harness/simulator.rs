//! Replays example reports through the full investigation pipeline

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, info_span, Instrument};

use reprodesk_core::{AnalysisResult, IssueId, IssueStatus, OriginRef};

use super::bus::{EventBus, SimEvent, SimulatedReporter};
use super::report::{ExampleResult, SimulationReport};
use crate::intake::{InboundReport, Intake, IntakeError};

const DEFAULT_USER_ID: &str = "simulated-user";
const DEFAULT_USERNAME: &str = "Simulated User";
const DEFAULT_CHANNEL_ID: &str = "simulated-channel";

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid example {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("example {} has an empty description", .0.display())]
    EmptyDescription(PathBuf),

    #[error("unsupported example file {}", .0.display())]
    Unsupported(PathBuf),

    #[error("user {0} already has a report in flight")]
    Busy(String),

    #[error(transparent)]
    Intake(#[from] IntakeError),
}

/// A report loaded from an example file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub name: String,
    pub description: String,
    pub user_id: String,
    pub username: String,
    pub channel_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExampleFile {
    description: String,
    user_id: Option<String>,
    username: Option<String>,
    channel_id: Option<String>,
}

/// Parse `*.json` or `*.md` example files
pub async fn load_example(path: &Path) -> Result<Example, HarnessError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let file = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str::<ExampleFile>(&text).map_err(|source| {
            HarnessError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?,
        Some("md") => ExampleFile {
            description: text,
            user_id: None,
            username: None,
            channel_id: None,
        },
        _ => return Err(HarnessError::Unsupported(path.to_path_buf())),
    };

    let description = file.description.trim().to_string();
    if description.is_empty() {
        return Err(HarnessError::EmptyDescription(path.to_path_buf()));
    }
    Ok(Example {
        name,
        description,
        user_id: file.user_id.unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
        username: file.username.unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
        channel_id: file
            .channel_id
            .unwrap_or_else(|| DEFAULT_CHANNEL_ID.to_string()),
    })
}

/// Example files in `dir`, sorted by file name
pub async fn list_examples(dir: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    let io_error = |source| HarnessError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        let path = entry.path();
        if is_file
            && matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json") | Some("md")
            )
        {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// One example run end to end
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub example: String,
    pub conversation: String,
    pub issue_id: IssueId,
    pub elapsed: Duration,
    pub final_status: IssueStatus,
    pub reproduced: Option<bool>,
    pub analysis: Option<AnalysisResult>,
    pub events: Vec<SimEvent>,
}

pub struct Simulator {
    intake: Arc<Intake>,
    bus: Arc<EventBus>,
    examples_dir: PathBuf,
}

impl Simulator {
    pub fn new(intake: Arc<Intake>, bus: Arc<EventBus>, examples_dir: impl Into<PathBuf>) -> Self {
        Self {
            intake,
            bus,
            examples_dir: examples_dir.into(),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Acknowledge, record and investigate one example
    pub async fn simulate(&self, path: &Path) -> Result<SimulationRun, HarnessError> {
        let example = load_example(path).await?;
        let conversation = uuid::Uuid::new_v4().to_string();
        let span = info_span!("simulation", example = %example.name, %conversation);

        async {
            let reporter = SimulatedReporter::new(Arc::clone(&self.bus), conversation.clone());
            let started = Instant::now();

            let report = InboundReport {
                user_id: example.user_id.clone(),
                username: example.username.clone(),
                content: example.description.clone(),
                origin: OriginRef {
                    message_id: format!("{conversation}-origin"),
                    channel_id: example.channel_id.clone(),
                    timestamp_ms: chrono::Utc::now().timestamp_millis(),
                },
            };
            let outward = self
                .intake
                .receive(report, &reporter)
                .await?
                .ok_or_else(|| HarnessError::Busy(example.user_id.clone()))?;
            let outcome = self.intake.begin(&outward, &reporter).await?;

            let run = SimulationRun {
                example: example.name.clone(),
                issue_id: outcome.issue_id,
                elapsed: started.elapsed(),
                final_status: outcome.final_status,
                reproduced: outcome.reproduction.as_ref().map(|r| r.reproduced),
                analysis: outcome.analysis,
                events: self.bus.events_for(&conversation),
                conversation: conversation.clone(),
            };
            info!(
                issue_id = run.issue_id,
                status = %run.final_status,
                elapsed_ms = run.elapsed.as_millis() as u64,
                "Example simulated"
            );
            Ok::<_, HarnessError>(run)
        }
        .instrument(span)
        .await
    }

    /// Run every example; one failure never stops the batch
    pub async fn run_all(&self) -> Result<SimulationReport, HarnessError> {
        let paths = list_examples(&self.examples_dir).await?;
        info!(count = paths.len(), dir = %self.examples_dir.display(), "Running examples");
        Ok(self.run_paths(&paths).await)
    }

    pub async fn run_paths(&self, paths: &[PathBuf]) -> SimulationReport {
        let mut report = SimulationReport::new();
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let started = Instant::now();
            match self.simulate(path).await {
                Ok(run) => report.push(ExampleResult::Completed(run)),
                Err(e) => {
                    error!(example = %name, "Example failed: {e}");
                    report.push(ExampleResult::Failed {
                        example: name,
                        elapsed: started.elapsed(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_json_and_markdown_examples() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("a.json");
        std::fs::write(
            &json,
            r#"{"description": "Login fails", "userId": "u7", "channelId": "c1"}"#,
        )
        .unwrap();
        let md = dir.path().join("b.md");
        std::fs::write(&md, "# Crash\nThe app crashes on save.\n").unwrap();

        let a = load_example(&json).await.unwrap();
        assert_eq!(a.description, "Login fails");
        assert_eq!(a.user_id, "u7");
        assert_eq!(a.username, DEFAULT_USERNAME);
        assert_eq!(a.channel_id, "c1");

        let b = load_example(&md).await.unwrap();
        assert!(b.description.starts_with("# Crash"));
        assert_eq!(b.user_id, DEFAULT_USER_ID);
    }

    #[tokio::test]
    async fn test_load_rejects_bad_examples() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        let empty = dir.path().join("empty.md");
        std::fs::write(&empty, "   \n").unwrap();

        assert!(matches!(load_example(&bad).await, Err(HarnessError::Parse { .. })));
        assert!(matches!(
            load_example(&empty).await,
            Err(HarnessError::EmptyDescription(_))
        ));
        assert!(matches!(
            load_example(&dir.path().join("missing.md")).await,
            Err(HarnessError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_examples_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.md", "a.json", "notes.txt", "c.json"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        let names: Vec<_> = list_examples(dir.path())
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.md", "c.json"]);
    }
}
