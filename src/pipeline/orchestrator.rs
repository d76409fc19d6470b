//! Investigation orchestrator
//!
//! Drives one issue through
//! IN_PROGRESS → ANALYZING → TESTING → RESOLVED | NEEDS_MAINTAINER.
//! Every transition appends an audit entry and then updates the issue
//! status. The first unrecoverable error ends the run in FAILED with a
//! single FAILED audit entry; nothing is retried or rolled back.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};

use reprodesk_core::{
    AnalysisResult, Details, Issue, IssueId, IssueStatus, IssueUpdate, NewInvestigationResult,
    ReproductionOutcome, Store, TestPlan,
};

use super::analysis::AnalysisStage;
use super::error::{format_error, PipelineError};
use super::followup::{render_questions, FollowUpStage};
use super::plan::PlanStage;
use super::report::{terminal_status, ReportStage};
use super::reproduction::{ReproductionSettings, ReproductionStage};
use crate::blob::BlobStore;
use crate::config::AppConfig;
use crate::exec::ProcessRunner;
use crate::llm::LanguageModel;
use crate::reporter::{edit_logged, reply_logged, MessageHandle, Reporter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvestigatorSettings {
    pub work_root: PathBuf,
    pub maintainer_id: Option<String>,
    pub reproduction: ReproductionSettings,
}

impl InvestigatorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            work_root: config.reproduction.work_root.clone(),
            maintainer_id: config.escalation.maintainer_id.clone(),
            reproduction: ReproductionSettings::from(&config.reproduction),
        }
    }
}

/// What one investigation produced
#[derive(Debug, Clone, PartialEq)]
pub struct InvestigationOutcome {
    pub issue_id: IssueId,
    pub final_status: IssueStatus,
    pub analysis: Option<AnalysisResult>,
    pub follow_up_questions: Vec<String>,
    pub plan: Option<TestPlan>,
    pub reproduction: Option<ReproductionOutcome>,
    pub summary: Option<String>,
    pub archive_url: Option<String>,
    pub result_id: Option<i64>,
    /// Formatted error when the run ended in FAILED
    pub error: Option<String>,
}

impl InvestigationOutcome {
    fn started(issue: &Issue) -> Self {
        Self {
            issue_id: issue.id,
            final_status: issue.status,
            analysis: None,
            follow_up_questions: Vec::new(),
            plan: None,
            reproduction: None,
            summary: None,
            archive_url: None,
            result_id: None,
            error: None,
        }
    }
}

pub struct Investigator {
    store: Arc<dyn Store>,
    analysis: AnalysisStage,
    follow_up: FollowUpStage,
    planner: PlanStage,
    reproduction: ReproductionStage,
    report: ReportStage,
    settings: InvestigatorSettings,
}

impl Investigator {
    pub fn new(
        store: Arc<dyn Store>,
        model: Arc<dyn LanguageModel>,
        runner: Arc<dyn ProcessRunner>,
        blobs: Arc<dyn BlobStore>,
        settings: InvestigatorSettings,
    ) -> Self {
        Self {
            analysis: AnalysisStage::new(Arc::clone(&model)),
            follow_up: FollowUpStage::new(Arc::clone(&model)),
            planner: PlanStage::new(Arc::clone(&model)),
            reproduction: ReproductionStage::new(
                Arc::clone(&model),
                runner,
                settings.reproduction.clone(),
            ),
            report: ReportStage::new(model, blobs),
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn work_dir(&self, issue_id: IssueId) -> PathBuf {
        self.settings.work_root.join(format!("issue-{issue_id}"))
    }

    /// Run the whole pipeline for `issue`
    ///
    /// Never fails: errors end the run in FAILED and are reported through
    /// the returned outcome. `progress` is the message edited as the run
    /// advances.
    pub async fn investigate(
        &self,
        issue: Issue,
        reporter: &dyn Reporter,
        progress: &MessageHandle,
    ) -> InvestigationOutcome {
        let span = info_span!("investigation", issue_id = issue.id);
        async move {
            info!("Starting investigation");
            let mut outcome = InvestigationOutcome::started(&issue);
            match self
                .run_stages(&issue, reporter, progress, &mut outcome)
                .await
            {
                Ok(()) => {
                    info!(status = %outcome.final_status, "Investigation finished");
                    outcome
                }
                Err(e) => self.fail(&issue, reporter, progress, outcome, e).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        issue: &Issue,
        reporter: &dyn Reporter,
        progress: &MessageHandle,
        outcome: &mut InvestigationOutcome,
    ) -> Result<(), PipelineError> {
        let work_dir = self.work_dir(issue.id);
        let work_dir_text = work_dir.to_string_lossy().into_owned();

        self.transition(
            outcome,
            IssueStatus::InProgress,
            "Investigation started",
            Some(details([("workingDir", json!(work_dir_text))])),
        )
        .await?;
        reset_work_dir(&work_dir).await?;

        // Analysis
        self.transition(
            outcome,
            IssueStatus::Analyzing,
            "Starting to analyze the issue",
            Some(details([("workingDir", json!(work_dir_text))])),
        )
        .await?;
        edit_logged(
            reporter,
            progress,
            "I'm analyzing your issue. I'll ask follow-up questions if needed.",
        )
        .await;

        let analysis = self.analysis.analyze(&issue.report).await;
        outcome.analysis = Some(analysis.clone());
        self.store
            .update_issue_fields(issue.id, IssueUpdate::new().analysis(analysis.clone()))
            .await?;

        let questions = self.follow_up.generate(&issue.report, &analysis).await;
        if !questions.is_empty() {
            edit_logged(reporter, progress, &render_questions(&questions)).await;
        }
        outcome.follow_up_questions = questions;

        let plan = self.planner.plan(&issue.report, &analysis).await;
        outcome.plan = Some(plan.clone());
        let mut steps = plan.reproduction_steps();
        if steps.is_empty() {
            steps = analysis.reproduction_steps.clone().unwrap_or_default();
        }
        if !steps.is_empty() {
            self.store
                .update_issue_fields(issue.id, IssueUpdate::new().recreation_steps(steps))
                .await?;
        }

        // Reproduction
        self.transition(
            outcome,
            IssueStatus::Testing,
            "Created test plan and starting test setup",
            Some(details([("testPlan", plan.clone().into_value())])),
        )
        .await?;
        edit_logged(
            reporter,
            progress,
            "Setting up a test environment to recreate your issue...",
        )
        .await;

        let reproduction = self
            .reproduction
            .reproduce(issue, &analysis, &plan, &work_dir)
            .await?;
        let result = reproduction.outcome;
        outcome.reproduction = Some(result.clone());

        // Report
        let summary = self.report.summarize(issue, &result).await;
        outcome.summary = Some(summary.clone());
        let archive_url = self.report.archive(issue.id, &work_dir, &summary).await;
        outcome.archive_url = archive_url.clone();

        let test_case_path = reproduction
            .artifacts
            .main_file
            .to_string_lossy()
            .into_owned();
        let stored = self
            .store
            .create_investigation_result(NewInvestigationResult {
                issue_id: issue.id,
                success: result.success,
                reproduced: result.reproduced,
                test_case_path: test_case_path.clone(),
                repository_url: result.repository_url.clone(),
                archive_url: archive_url.clone(),
                result_summary: summary.clone(),
                execution_time_ms: result.duration_ms,
                maintainer_notes: None,
            })
            .await?;
        outcome.result_id = Some(stored.id);

        let escalate_to = self
            .settings
            .maintainer_id
            .clone()
            .filter(|_| result.reproduced);
        self.store
            .update_issue_fields(
                issue.id,
                IssueUpdate::new()
                    .result_summary(summary.clone())
                    .archive_url(archive_url.clone())
                    .repository_url(result.repository_url.clone())
                    .test_case_path(test_case_path)
                    .assigned_maintainer(escalate_to.clone()),
            )
            .await?;

        let final_status = terminal_status(&result);
        let message = if result.reproduced {
            "Issue reproduced; a maintainer needs to take over"
        } else {
            "Investigation complete; the issue could not be reproduced"
        };
        self.transition(
            outcome,
            final_status,
            message,
            Some(details([
                ("reproduced", json!(result.reproduced)),
                ("success", json!(result.success)),
                ("exitCode", json!(result.exit_code)),
                ("executionTimeMs", json!(result.duration_ms)),
            ])),
        )
        .await?;

        if let Some(maintainer) = escalate_to {
            let location = archive_url.as_deref().unwrap_or("(test results in database)");
            reply_logged(
                reporter,
                &format!(
                    "<@{maintainer}> I've reproduced this issue and created a test case. \
                     Please check the details here: {location}"
                ),
            )
            .await;
        }

        let final_message = if result.reproduced {
            "I've successfully recreated your issue! A test case has been created and a \
             maintainer has been notified."
                .to_string()
        } else {
            format!(
                "I've investigated your issue but wasn't able to reproduce it with the \
                 information provided. Here's what I found:\n\n{summary}"
            )
        };
        edit_logged(reporter, progress, &final_message).await;
        Ok(())
    }

    /// Append the audit entry, then move the issue status
    async fn transition(
        &self,
        outcome: &mut InvestigationOutcome,
        next: IssueStatus,
        message: &str,
        details: Option<Details>,
    ) -> Result<(), PipelineError> {
        let from = outcome.final_status;
        if !from.can_advance_to(next) {
            return Err(PipelineError::IllegalTransition { from, to: next });
        }
        self.store
            .append_investigation_update(outcome.issue_id, next, message, details)
            .await?;
        self.store
            .update_issue_status(outcome.issue_id, next)
            .await?;
        outcome.final_status = next;
        info!(status = %next, "{message}");
        Ok(())
    }

    async fn fail(
        &self,
        issue: &Issue,
        reporter: &dyn Reporter,
        progress: &MessageHandle,
        mut outcome: InvestigationOutcome,
        err: PipelineError,
    ) -> InvestigationOutcome {
        let text = format_error(&err);
        error!("Investigation failed: {text}");
        outcome.error = Some(text.clone());

        if outcome.final_status.is_terminal() {
            return outcome;
        }

        if let Err(e) = self
            .store
            .append_investigation_update(
                issue.id,
                IssueStatus::Failed,
                &format!("Investigation failed: {text}"),
                Some(details([("error", json!(text))])),
            )
            .await
        {
            error!("Could not record failure: {e}");
        }
        if let Err(e) = self
            .store
            .update_issue_status(issue.id, IssueStatus::Failed)
            .await
        {
            error!("Could not mark issue as failed: {e}");
        }
        outcome.final_status = IssueStatus::Failed;

        edit_logged(
            reporter,
            progress,
            "I encountered an error while investigating your issue. A maintainer will be \
             notified to help you.",
        )
        .await;
        if let Some(maintainer) = &self.settings.maintainer_id {
            reply_logged(
                reporter,
                &format!(
                    "<@{maintainer}> There was an error investigating this issue. \
                     Please check the logs."
                ),
            )
            .await;
        }
        outcome
    }
}

/// Start from an empty directory; ids can repeat across store instances
async fn reset_work_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "Removed stale working directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}

fn details<const N: usize>(entries: [(&str, Value); N]) -> Details {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
