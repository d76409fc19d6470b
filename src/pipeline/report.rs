//! Summary, archive and terminal status

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

use reprodesk_core::{Issue, IssueId, IssueStatus, ReproductionOutcome};

use super::error::{format_error, PipelineError};
use crate::blob::BlobStore;
use crate::llm::{prompts, LanguageModel};

pub const SUMMARY_FILE: &str = "SUMMARY.md";
pub const ARCHIVE_CONTENT_TYPE: &str = "application/json";

/// Larger files are left out of the archive
const MAX_ARCHIVED_FILE_BYTES: u64 = 1024 * 1024;

/// Object key of an issue's archive
pub fn archive_key(issue_id: IssueId) -> String {
    format!("issues/issue-{issue_id}/results.json")
}

/// Reproduced issues need a maintainer; "could not confirm" counts as resolved
pub fn terminal_status(outcome: &ReproductionOutcome) -> IssueStatus {
    if outcome.reproduced {
        IssueStatus::NeedsMaintainer
    } else {
        IssueStatus::Resolved
    }
}

#[derive(Debug, Serialize)]
struct ArchivedFile {
    path: String,
    contents: String,
}

#[derive(Debug, Serialize)]
struct ArchiveBundle {
    issue_id: IssueId,
    files: Vec<ArchivedFile>,
}

/// JSON bundle of every text file under `dir`
///
/// The cloned `project/` tree is skipped.
pub fn bundle_directory(issue_id: IssueId, dir: &Path) -> Result<Vec<u8>, PipelineError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == "project"));

    for entry in walker {
        let entry = entry.map_err(|e| {
            PipelineError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.metadata().map(|m| m.len()).unwrap_or(0) > MAX_ARCHIVED_FILE_BYTES {
            continue;
        }
        let bytes = std::fs::read(entry.path())?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        files.push(ArchivedFile {
            path: relative,
            contents: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }

    Ok(serde_json::to_vec_pretty(&ArchiveBundle { issue_id, files })?)
}

pub struct ReportStage {
    model: Arc<dyn LanguageModel>,
    blobs: Arc<dyn BlobStore>,
}

impl ReportStage {
    pub fn new(model: Arc<dyn LanguageModel>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { model, blobs }
    }

    /// Model-written summary, or the template when the model fails
    pub async fn summarize(&self, issue: &Issue, outcome: &ReproductionOutcome) -> String {
        match self
            .model
            .complete(
                &prompts::summary_prompt(&issue.report, outcome),
                prompts::SUMMARY_SYSTEM,
            )
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!(stage = "report", "Empty summary, using template");
                prompts::fallback_summary(issue.id, outcome)
            }
            Err(e) => {
                warn!(stage = "report", "Model call failed, using template: {e}");
                prompts::fallback_summary(issue.id, outcome)
            }
        }
    }

    /// Write the summary, bundle the working directory and upload it
    ///
    /// Best effort: any failure is logged and yields `None`.
    pub async fn archive(&self, issue_id: IssueId, work_dir: &Path, summary: &str) -> Option<String> {
        match self.try_archive(issue_id, work_dir, summary).await {
            Ok(url) => {
                info!(stage = "report", issue_id, %url, "Archive uploaded");
                Some(url)
            }
            Err(e) => {
                warn!(stage = "report", issue_id, "Archive upload failed: {e}");
                None
            }
        }
    }

    async fn try_archive(
        &self,
        issue_id: IssueId,
        work_dir: &Path,
        summary: &str,
    ) -> Result<String, String> {
        tokio::fs::write(work_dir.join(SUMMARY_FILE), summary)
            .await
            .map_err(|e| format_error(&e))?;
        let dir = work_dir.to_path_buf();
        let bundle = tokio::task::spawn_blocking(move || bundle_directory(issue_id, &dir))
            .await
            .map_err(|e| format_error(&e))?
            .map_err(|e| format_error(&e))?;
        self.blobs
            .upload(&archive_key(issue_id), bundle, ARCHIVE_CONTENT_TYPE)
            .await
            .map_err(|e| format_error(&e))
    }
}
